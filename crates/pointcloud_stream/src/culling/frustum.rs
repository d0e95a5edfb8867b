//! Conservative box-versus-frustum test in normalised device space.
//!
//! 1. Project the 8 corners. A corner behind the near plane is replaced by
//!    the points where its 3 edges cross the near plane.
//! 2. Build the convex hull of the projected points (Andrew's monotone chain).
//! 3. Clip the hull against `[-1,1] x [-1,1]` one edge at a time.
//!
//! Fewer than 3 points after any step means the box is culled. The test
//! over-includes boxes that only touch the viewport, never the reverse.

use glam::{DVec2, DVec3, DVec4};
use smallvec::SmallVec;

use super::CameraParams;

/// Each corner's 3 edge neighbours, corners indexed by `(x << 2) | (y << 1) | z`.
const CORNER_NEIGHBORS: [[usize; 3]; 8] = [
  [4, 2, 1],
  [5, 3, 0],
  [6, 0, 3],
  [7, 1, 2],
  [0, 6, 5],
  [1, 7, 4],
  [2, 4, 7],
  [3, 5, 6],
];

type Polygon = SmallVec<[DVec2; 24]>;

/// Visibility test bound to one camera.
#[derive(Clone, Copy, Debug)]
pub struct FrustumCuller {
  row_x: DVec4,
  row_y: DVec4,
  row_w: DVec4,
  near: f64,
}

impl FrustumCuller {
  pub fn new(camera: &CameraParams) -> Self {
    Self {
      row_x: camera.row(0),
      row_y: camera.row(1),
      row_w: camera.row(3),
      near: camera.near,
    }
  }

  /// Potential visibility of the box `center ± extents`.
  pub fn is_visible(&self, center: DVec3, extents: DVec3) -> bool {
    let mut corners = [DVec4::ZERO; 8];
    let mut depths = [0.0f64; 8];
    let mut any_in_front = false;
    for (i, corner) in corners.iter_mut().enumerate() {
      let sign = DVec3::new(
        if (i >> 2) & 1 == 1 { 1.0 } else { -1.0 },
        if (i >> 1) & 1 == 1 { 1.0 } else { -1.0 },
        if i & 1 == 1 { 1.0 } else { -1.0 },
      );
      *corner = (center + extents * sign).extend(1.0);
      depths[i] = self.row_w.dot(*corner);
      any_in_front |= depths[i] > self.near;
    }
    if !any_in_front {
      return false;
    }

    let mut projected = Polygon::new();
    for i in 0..8 {
      if depths[i] >= self.near {
        projected.push(self.project(corners[i], depths[i]));
        continue;
      }
      for &j in &CORNER_NEIGHBORS[i] {
        if depths[j] > self.near {
          let t = (self.near - depths[i]) / (depths[j] - depths[i]);
          let crossing = corners[i] + (corners[j] - corners[i]) * t;
          projected.push(self.project(crossing, self.near));
        }
      }
    }
    if projected.len() < 3 {
      return false;
    }

    let hull = convex_hull(&mut projected);
    if hull.len() < 3 {
      return false;
    }
    clip_to_viewport(hull).len() >= 3
  }

  #[inline]
  fn project(&self, p: DVec4, w: f64) -> DVec2 {
    DVec2::new(self.row_x.dot(p) / w, self.row_y.dot(p) / w)
  }
}

#[inline]
fn cross(o: DVec2, a: DVec2, b: DVec2) -> f64 {
  (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Counter-clockwise hull; collinear and duplicate points are dropped.
fn convex_hull(points: &mut Polygon) -> Polygon {
  points.sort_by(|a, b| {
    a.x
      .partial_cmp(&b.x)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
  });

  let mut hull = Polygon::new();
  for &p in points.iter() {
    while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
      hull.pop();
    }
    hull.push(p);
  }
  let lower_len = hull.len() + 1;
  for &p in points.iter().rev().skip(1) {
    while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
      hull.pop();
    }
    hull.push(p);
  }
  // Last point repeats the first.
  hull.pop();
  hull
}

/// Sutherland-Hodgman against the four viewport edges.
fn clip_to_viewport(mut polygon: Polygon) -> Polygon {
  // (axis, limit, keep values below the limit)
  const EDGES: [(usize, f64, bool); 4] = [(0, -1.0, false), (1, -1.0, false), (0, 1.0, true), (1, 1.0, true)];

  for (axis, limit, keep_below) in EDGES {
    let inside = |p: DVec2| {
      if keep_below {
        p[axis] <= limit
      } else {
        p[axis] >= limit
      }
    };

    let mut clipped = Polygon::new();
    let mut prev = polygon[polygon.len() - 1];
    for &curr in polygon.iter() {
      match (inside(prev), inside(curr)) {
        (true, true) => clipped.push(curr),
        (true, false) => clipped.push(edge_crossing(prev, curr, axis, limit)),
        (false, true) => {
          clipped.push(edge_crossing(prev, curr, axis, limit));
          clipped.push(curr);
        }
        (false, false) => {}
      }
      prev = curr;
    }
    if clipped.len() < 3 {
      return clipped;
    }
    polygon = clipped;
  }
  polygon
}

#[inline]
fn edge_crossing(a: DVec2, b: DVec2, axis: usize, limit: f64) -> DVec2 {
  let t = (limit - a[axis]) / (b[axis] - a[axis]);
  a + (b - a) * t
}

#[cfg(test)]
#[path = "frustum_test.rs"]
mod frustum_test;
