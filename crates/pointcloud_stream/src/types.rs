//! Point records and the per-node display payloads built from them.

use std::sync::Arc;

use glam::Vec3;

/// One parsed point. Immutable once parsed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointRecord {
  /// Display-space (Y-up) position.
  pub position: Vec3,
  /// Packed RGBA.
  pub color: [u8; 4],
  /// `(classification << 16) | intensity`.
  pub attributes: u32,
}

impl PointRecord {
  #[inline]
  pub fn pack_attributes(intensity: u16, classification: u8) -> u32 {
    ((classification as u32) << 16) | intensity as u32
  }

  #[inline]
  pub fn intensity(&self) -> u16 {
    (self.attributes & 0xFFFF) as u16
  }

  #[inline]
  pub fn classification(&self) -> u8 {
    ((self.attributes >> 16) & 0xFF) as u8
  }
}

/// A node's augmented points bucketed by octant.
///
/// Points of octant `o` live in `points[offsets[o]..offsets[o + 1]]`.
#[derive(Clone, Debug)]
pub struct PartitionedPoints {
  pub points: Arc<[PointRecord]>,
  pub offsets: [u32; 9],
}

impl PartitionedPoints {
  pub fn empty() -> Self {
    Self {
      points: Arc::from(Vec::new()),
      offsets: [0; 9],
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.points.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Points that fall in `octant`.
  pub fn octant(&self, octant: u8) -> &[PointRecord] {
    let o = octant as usize;
    &self.points[self.offsets[o] as usize..self.offsets[o + 1] as usize]
  }

  pub fn octant_count(&self, octant: u8) -> u32 {
    let o = octant as usize;
    self.offsets[o + 1] - self.offsets[o]
  }
}

/// Intensity window used to normalise intensity for display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityRange {
  pub min: f32,
  pub max: f32,
}

/// Values computed once a node's points are batched.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayStats {
  /// Present only when the layout carries intensity.
  pub intensity_range: Option<IntensityRange>,
  /// 12 bounding-box edges as 24 endpoints.
  pub edges: [Vec3; 24],
}
