//! Axis-aligned node bounds in display space.

use glam::{DVec3, Vec3};

use crate::constants::{BOX_EDGES, OCTANT_BIT};

/// Box stored as center plus half-extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeBounds {
  pub center: DVec3,
  pub extents: DVec3,
}

impl NodeBounds {
  #[inline]
  pub fn from_center_extents(center: DVec3, extents: DVec3) -> Self {
    Self { center, extents }
  }

  pub fn from_min_max(min: DVec3, max: DVec3) -> Self {
    Self {
      center: (min + max) * 0.5,
      extents: (max - min) * 0.5,
    }
  }

  #[inline]
  pub fn min(&self) -> DVec3 {
    self.center - self.extents
  }

  #[inline]
  pub fn max(&self) -> DVec3 {
    self.center + self.extents
  }

  #[inline]
  pub fn size(&self) -> DVec3 {
    self.extents * 2.0
  }

  pub fn contains_point(&self, p: DVec3) -> bool {
    let min = self.min();
    let max = self.max();
    p.cmpge(min).all() && p.cmple(max).all()
  }

  /// Whether display axis `axis` is on the upper side for `octant`.
  #[inline]
  pub fn octant_bit_set(octant: u8, axis: usize) -> bool {
    octant & OCTANT_BIT[axis] != 0
  }

  /// Bounds of child `octant`.
  ///
  /// Axis bits follow [`OCTANT_BIT`] (x = 4, y = 1, z = 2), not the usual
  /// x-major layout.
  pub fn child(&self, octant: u8) -> Self {
    let min = self.min();
    let mut center = DVec3::ZERO;
    for axis in 0..3 {
      let bit = if Self::octant_bit_set(octant, axis) { 1.0 } else { 0.0 };
      center[axis] = min[axis] + (bit + 0.5) * self.extents[axis];
    }
    Self {
      center,
      extents: self.extents * 0.5,
    }
  }

  /// Octant of `p` relative to this box's center (strictly greater is upper).
  #[inline]
  pub fn octant_of(&self, p: Vec3) -> u8 {
    octant_of(self.center.as_vec3(), p)
  }

  /// Corner `i`, where `i = (x << 2) | (y << 1) | z` selects the max side.
  pub fn corner(&self, i: usize) -> DVec3 {
    let pick = |bit: usize, axis: usize| {
      if (i >> bit) & 1 == 1 {
        self.center[axis] + self.extents[axis]
      } else {
        self.center[axis] - self.extents[axis]
      }
    };
    DVec3::new(pick(2, 0), pick(1, 1), pick(0, 2))
  }

  /// The 12 edges as 24 endpoints.
  pub fn edges(&self) -> [Vec3; 24] {
    let mut out = [Vec3::ZERO; 24];
    for (e, &(a, b)) in BOX_EDGES.iter().enumerate() {
      out[e * 2] = self.corner(a).as_vec3();
      out[e * 2 + 1] = self.corner(b).as_vec3();
    }
    out
  }
}

/// Octant of `p` relative to `center`.
#[inline]
pub fn octant_of(center: Vec3, p: Vec3) -> u8 {
  let mut octant = 0u8;
  for axis in 0..3 {
    if p[axis] > center[axis] {
      octant |= OCTANT_BIT[axis];
    }
  }
  octant
}
