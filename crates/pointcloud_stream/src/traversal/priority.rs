//! Screen-space importance of a node.
//!
//! ```text
//!   w        = max(row3 . c - extent_x * sqrt(3), near)
//!   x, y, z  = row0/1/2 . c / w, clamped to [-1,1] (x, y) and [0,1] (z)
//!   weight_xy = max(sqrt(2) - sigma_xy^2 * (x^2 + y^2), 0)
//!   weight_z  = max(1 - sigma_z^2 * z^2, 0)
//!   priority  = spacing / w * weight_xy * weight_z
//! ```
//!
//! A box that fails the frustum test has priority exactly 0.

use glam::DVec4;

use super::params::TraversalParams;
use crate::culling::{CameraParams, FrustumCuller};
use crate::octree::NodeBounds;

/// Priority function bound to one camera and parameter set.
#[derive(Clone, Copy, Debug)]
pub struct PriorityModel {
  culler: FrustumCuller,
  rows: [DVec4; 4],
  near: f64,
  sigma_xy_sq: f64,
  sigma_z_sq: f64,
}

impl PriorityModel {
  pub fn new(camera: &CameraParams, params: &TraversalParams) -> Self {
    Self {
      culler: FrustumCuller::new(camera),
      rows: [camera.row(0), camera.row(1), camera.row(2), camera.row(3)],
      near: camera.near,
      sigma_xy_sq: params.sigma_xy_sq(),
      sigma_z_sq: params.sigma_z_sq(),
    }
  }

  /// Priority before the parent clamp.
  pub fn priority(&self, bounds: &NodeBounds, spacing: f64) -> f64 {
    if !self.culler.is_visible(bounds.center, bounds.extents) {
      return 0.0;
    }

    let c = bounds.center.extend(1.0);
    let w = (self.rows[3].dot(c) - bounds.extents.x * 3f64.sqrt()).max(self.near);
    let x = (self.rows[0].dot(c) / w).clamp(-1.0, 1.0);
    let y = (self.rows[1].dot(c) / w).clamp(-1.0, 1.0);
    let z = (self.rows[2].dot(c) / w).clamp(0.0, 1.0);

    let weight_xy = (2f64.sqrt() - self.sigma_xy_sq * (x * x + y * y)).max(0.0);
    let weight_z = (1.0 - self.sigma_z_sq * z * z).max(0.0);
    spacing / w * weight_xy * weight_z
  }
}
