//! Byte masks: per-octant bitsets and node status flags.

use std::ops::{BitAnd, BitOr};

/// One bit per child octant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OctantMask(pub u8);

impl OctantMask {
  pub const EMPTY: Self = Self(0);
  pub const FULL: Self = Self(0xFF);

  #[inline]
  pub fn contains(self, octant: u8) -> bool {
    self.0 & (1 << octant) != 0
  }

  #[inline]
  pub fn set(&mut self, octant: u8) {
    self.0 |= 1 << octant;
  }

  #[inline]
  pub fn clear(&mut self, octant: u8) {
    self.0 &= !(1 << octant);
  }

  #[inline]
  pub fn is_empty(self) -> bool {
    self.0 == 0
  }

  #[inline]
  pub fn bits(self) -> u8 {
    self.0
  }

  pub fn count(self) -> u32 {
    self.0.count_ones()
  }

  pub fn iter(self) -> impl Iterator<Item = u8> {
    (0..8u8).filter(move |&o| self.contains(o))
  }
}

impl BitAnd for OctantMask {
  type Output = Self;

  fn bitand(self, rhs: Self) -> Self {
    Self(self.0 & rhs.0)
  }
}

impl BitOr for OctantMask {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self {
    Self(self.0 | rhs.0)
  }
}

/// Traversal status flags of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeFlags(u8);

impl NodeFlags {
  /// Candidate in the traversal queue.
  pub const IN_TRAVERSAL: Self = Self(1 << 0);
  /// Member of the rendered-cut queue.
  pub const ON_RENDERED_CUT: Self = Self(1 << 1);
  /// A page load for this node is in flight.
  pub const PAGE_LOADING: Self = Self(1 << 2);
  /// Promoted from candidate and not yet torn down.
  pub const ADMITTED: Self = Self(1 << 3);

  #[inline]
  pub fn contains(self, flag: Self) -> bool {
    self.0 & flag.0 == flag.0
  }

  #[inline]
  pub fn insert(&mut self, flag: Self) {
    self.0 |= flag.0;
  }

  #[inline]
  pub fn remove(&mut self, flag: Self) {
    self.0 &= !flag.0;
  }

  #[inline]
  pub fn bits(self) -> u8 {
    self.0
  }
}
