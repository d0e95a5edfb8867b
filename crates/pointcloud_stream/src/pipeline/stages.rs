//! Work functions for each load stage. Pure and worker-safe.
//!
//! ```text
//! ┌─────────┐     ┌─────────┐     ┌──────────┐     ┌─────────────┐
//! │ Reading ├────►│ Parsing ├────►│ Batching ├────►│ PostLoading │
//! └─────────┘     └─────────┘     └──────────┘     └─────────────┘
//!   raw bytes    PointRecords    own + parent       intensity window,
//!                                octant slice,      box edges
//!                                9 offsets
//! ```

use std::sync::Arc;

use glam::{DVec3, Vec3};

use crate::constants::AXIS_INDEX;
use crate::error::PointDataError;
use crate::octree::{octant_of, AttributeOffsets, NodeBounds};
use crate::reader::RecordView;
use crate::source::DataSource;
use crate::types::{DisplayStats, IntensityRange, PartitionedPoints, PointRecord};

/// Fetches a node's point file.
pub fn read_points(source: &dyn DataSource, path: &str) -> Result<Vec<u8>, PointDataError> {
  source.read(path).map_err(|source| PointDataError::Io {
    path: path.to_string(),
    source,
  })
}

/// Decodes fixed-stride records into display-space points.
///
/// `min` is the node's display-space minimum corner; quantised file
/// coordinates are relative to it.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "points::parse"))]
pub fn parse_points(
  bytes: &[u8],
  offsets: &AttributeOffsets,
  min: DVec3,
  scale: f64,
  path: &str,
) -> Result<Vec<PointRecord>, PointDataError> {
  let stride = offsets.stride;
  if stride == 0 || bytes.len() % stride != 0 {
    return Err(PointDataError::Misaligned {
      path: path.to_string(),
      len: bytes.len(),
      stride,
    });
  }

  let mut points = Vec::with_capacity(bytes.len() / stride);
  for record in bytes.chunks_exact(stride) {
    let view = RecordView::new(record);

    let mut position = Vec3::ZERO;
    for k in 0..3 {
      let quantised = view.u32_at(offsets.position + 4 * AXIS_INDEX[k]).unwrap_or(0);
      position[k] = (quantised as f64 * scale + min[k]) as f32;
    }
    let color = offsets.color.and_then(|o| view.array4_at(o)).unwrap_or([0; 4]);
    let intensity = offsets.intensity.and_then(|o| view.u16_at(o)).unwrap_or(0);
    let classification = offsets.classification.and_then(|o| view.u8_at(o)).unwrap_or(0);

    points.push(PointRecord {
      position,
      color,
      attributes: PointRecord::pack_attributes(intensity, classification),
    });
  }
  Ok(points)
}

/// Buckets `own` followed by `parent_slice` by octant around `center`.
///
/// A counting sort: `offsets[o]..offsets[o + 1]` holds octant `o`.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "points::batch"))]
pub fn batch(own: &[PointRecord], parent_slice: &[PointRecord], center: Vec3) -> PartitionedPoints {
  let mut counts = [0u32; 8];
  let octants: Vec<u8> = own
    .iter()
    .chain(parent_slice)
    .map(|p| {
      let o = octant_of(center, p.position);
      counts[o as usize] += 1;
      o
    })
    .collect();

  let mut offsets = [0u32; 9];
  for o in 0..8 {
    offsets[o + 1] = offsets[o] + counts[o];
  }

  let mut cursor = [0u32; 8];
  cursor.copy_from_slice(&offsets[..8]);
  let mut sorted = vec![PointRecord::default(); octants.len()];
  for (point, &o) in own.iter().chain(parent_slice).zip(&octants) {
    let slot = &mut cursor[o as usize];
    sorted[*slot as usize] = *point;
    *slot += 1;
  }

  PartitionedPoints {
    points: Arc::from(sorted),
    offsets,
  }
}

/// Display window `mean ± 2σ` over intensities, clamped to the u16 range.
pub fn intensity_range(points: &[PointRecord]) -> Option<IntensityRange> {
  if points.is_empty() {
    return None;
  }
  let n = points.len() as f64;
  let mean = points.iter().map(|p| p.intensity() as f64).sum::<f64>() / n;
  let variance = points
    .iter()
    .map(|p| {
      let d = p.intensity() as f64 - mean;
      d * d
    })
    .sum::<f64>()
    / n;
  let sigma = variance.sqrt();
  let max_value = u16::MAX as f64;
  Some(IntensityRange {
    min: (mean - 2.0 * sigma).clamp(0.0, max_value) as f32,
    max: (mean + 2.0 * sigma).clamp(0.0, max_value) as f32,
  })
}

/// Per-node values the renderer needs besides the points.
pub fn post_load(own: &[PointRecord], has_intensity: bool, bounds: &NodeBounds) -> DisplayStats {
  DisplayStats {
    intensity_range: if has_intensity { intensity_range(own) } else { None },
    edges: bounds.edges(),
  }
}

#[cfg(test)]
#[path = "stages_test.rs"]
mod stages_test;
