//! Camera parameters and box-versus-frustum visibility.

mod frustum;

pub use frustum::FrustumCuller;

use glam::{DMat4, DVec3, DVec4};

/// Camera state consumed by culling and prioritisation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
  /// World-to-clip transform. Clip-space w must be positive in front of the camera.
  pub view_projection: DMat4,
  /// Distance to the near clip plane.
  pub near: f64,
}

impl CameraParams {
  pub fn new(view_projection: DMat4, near: f64) -> Self {
    Self {
      view_projection,
      near,
    }
  }

  /// Right-handed perspective camera at `eye` looking at `target`.
  pub fn look_at(
    eye: DVec3,
    target: DVec3,
    up: DVec3,
    fov_y_radians: f64,
    aspect: f64,
    near: f64,
    far: f64,
  ) -> Self {
    let view = DMat4::look_at_rh(eye, target, up);
    let projection = DMat4::perspective_rh(fov_y_radians, aspect, near, far);
    Self::new(projection * view, near)
  }

  /// Row `i` of the view-projection matrix.
  #[inline]
  pub fn row(&self, i: usize) -> DVec4 {
    self.view_projection.row(i)
  }
}
