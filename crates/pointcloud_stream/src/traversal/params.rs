//! Tuning inputs for traversal.

/// Point budget and priority falloff.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraversalParams {
  /// Ceiling on the summed point count of displayed nodes.
  pub point_budget: u64,
  /// Falloff towards the viewport edges, in [0, 1]. Higher keeps more of the periphery.
  pub decay_xy: f64,
  /// Falloff with depth, in [0, 1]. Higher keeps more distant nodes.
  pub decay_z: f64,
}

impl TraversalParams {
  pub const DEFAULT: Self = Self {
    point_budget: 1_000_000,
    decay_xy: 0.5,
    decay_z: 0.5,
  };

  pub fn with_budget(point_budget: u64) -> Self {
    Self {
      point_budget,
      ..Self::DEFAULT
    }
  }

  /// `sigma_xy^2 = 1 - decay_xy`.
  #[inline]
  pub fn sigma_xy_sq(&self) -> f64 {
    1.0 - self.decay_xy.clamp(0.0, 1.0)
  }

  /// `sigma_z^2 = 1 - decay_z`.
  #[inline]
  pub fn sigma_z_sq(&self) -> f64 {
    1.0 - self.decay_z.clamp(0.0, 1.0)
  }

  /// True if switching to `other` changes node priorities.
  pub fn projection_differs(&self, other: &Self) -> bool {
    self.decay_xy != other.decay_xy || self.decay_z != other.decay_z
  }
}

impl Default for TraversalParams {
  fn default() -> Self {
    Self::DEFAULT
  }
}
