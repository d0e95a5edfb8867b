use glam::{DVec3, Vec3};

use super::*;
use crate::octree::TreeMetadata;
use crate::source::MemorySource;
use crate::test_utils::{approx_eq, sample_point, TreeFixture};

fn point_at(x: f32, y: f32, z: f32, intensity: u16) -> PointRecord {
  PointRecord {
    position: Vec3::new(x, y, z),
    color: [1, 2, 3, 255],
    attributes: PointRecord::pack_attributes(intensity, 2),
  }
}

fn fixture_bin(fixture: &TreeFixture, name: &str) -> Vec<u8> {
  let suffix = format!("{name}.bin");
  fixture
    .files()
    .into_iter()
    .find(|(path, _)| path.ends_with(&suffix))
    .map(|(_, bytes)| bytes)
    .unwrap()
}

// ===== Batch 1: Reading and parsing =====

#[test]
fn test_parse_recovers_fixture_points() {
  let fixture = TreeFixture::new(5).node("r", 40).node("r3", 12);
  let meta = TreeMetadata::from_json(fixture.metadata_json().as_bytes()).unwrap();
  let offsets = meta.layout.offsets();

  for name in ["r", "r3"] {
    let bounds = fixture.bounds_of(name);
    let bytes = fixture_bin(&fixture, name);
    let points = parse_points(&bytes, &offsets, bounds.min(), meta.scale, name).unwrap();
    let expected = &fixture.nodes[name];
    assert_eq!(points.len(), expected.len());
    for (got, want) in points.iter().zip(expected) {
      assert!(approx_eq(got.position, want.position, 1e-4), "{name}: {got:?} vs {want:?}");
      assert_eq!(got.color, want.color);
      assert_eq!(got.intensity(), want.intensity());
      assert_eq!(got.classification(), want.classification());
    }
  }
}

#[test]
fn test_parse_swaps_file_y_and_z() {
  let fixture = TreeFixture::new(5).node("r", 1);
  let meta = TreeMetadata::from_json(fixture.metadata_json().as_bytes()).unwrap();
  let offsets = meta.layout.offsets();

  // file (x, y, z) = (1000, 2000, 3000) millimetres
  let mut record = Vec::new();
  for c in [1000u32, 2000, 3000] {
    record.extend_from_slice(&c.to_le_bytes());
  }
  record.extend_from_slice(&[9, 8, 7, 6]);
  record.extend_from_slice(&500u16.to_le_bytes());
  record.push(3);

  let points = parse_points(&record, &offsets, DVec3::new(10.0, 20.0, 30.0), 0.001, "p").unwrap();
  assert_eq!(points.len(), 1);
  assert!(approx_eq(points[0].position, Vec3::new(11.0, 23.0, 32.0), 1e-5));
  assert_eq!(points[0].color, [9, 8, 7, 6]);
  assert_eq!(points[0].attributes, (3 << 16) | 500);
}

#[test]
fn test_parse_rejects_misaligned_file() {
  let fixture = TreeFixture::new(5).node("r", 3);
  let meta = TreeMetadata::from_json(fixture.metadata_json().as_bytes()).unwrap();
  let mut bytes = fixture_bin(&fixture, "r");
  bytes.pop();

  let err = parse_points(&bytes, &meta.layout.offsets(), DVec3::ZERO, meta.scale, "r.bin").unwrap_err();
  assert!(matches!(err, PointDataError::Misaligned { len: 56, stride: 19, .. }));
}

#[test]
fn test_parse_empty_file() {
  let fixture = TreeFixture::new(5).node("r", 1);
  let meta = TreeMetadata::from_json(fixture.metadata_json().as_bytes()).unwrap();
  let points = parse_points(&[], &meta.layout.offsets(), DVec3::ZERO, meta.scale, "r.bin").unwrap();
  assert!(points.is_empty());
}

#[test]
fn test_missing_attributes_read_as_zero() {
  let offsets = AttributeOffsets {
    position: 0,
    color: None,
    intensity: None,
    classification: None,
    stride: 12,
  };
  let bytes: Vec<u8> = [5u32, 6, 7].iter().flat_map(|c| c.to_le_bytes()).collect();
  let points = parse_points(&bytes, &offsets, DVec3::ZERO, 1.0, "p").unwrap();
  assert_eq!(points[0].position, Vec3::new(5.0, 7.0, 6.0));
  assert_eq!(points[0].color, [0; 4]);
  assert_eq!(points[0].attributes, 0);
}

#[test]
fn test_read_points_reports_path() {
  let source = MemorySource::new();
  source.insert("data/r/r.bin", vec![1, 2, 3]);
  assert_eq!(read_points(&source, "data/r/r.bin").unwrap(), vec![1, 2, 3]);

  let err = read_points(&source, "data/r/r0.bin").unwrap_err();
  match err {
    PointDataError::Io { path, .. } => assert_eq!(path, "data/r/r0.bin"),
    other => panic!("unexpected {other:?}"),
  }
}

// ===== Batch 2: Batching =====

fn assert_partition_consistent(batch: &PartitionedPoints, center: Vec3) {
  assert_eq!(batch.offsets[0], 0);
  assert_eq!(batch.offsets[8] as usize, batch.len());
  let total: u32 = (0..8).map(|o| batch.octant_count(o)).sum();
  assert_eq!(total as usize, batch.len());
  for o in 0..8u8 {
    for p in batch.octant(o) {
      assert_eq!(octant_of(center, p.position), o, "{p:?} filed under {o}");
    }
  }
}

#[test]
fn test_batch_partitions_own_points() {
  let bounds = NodeBounds::from_min_max(DVec3::ZERO, DVec3::splat(64.0));
  let own: Vec<_> = (0..500).map(|i| sample_point(&bounds, i)).collect();
  let center = bounds.center.as_vec3();

  let batch = batch(&own, &[], center);
  assert_eq!(batch.len(), 500);
  assert_partition_consistent(&batch, center);
  assert!((0..8).all(|o| batch.octant_count(o) > 0));
}

#[test]
fn test_batch_appends_parent_octant_slice() {
  let parent_bounds = NodeBounds::from_min_max(DVec3::ZERO, DVec3::splat(64.0));
  let parent_points: Vec<_> = (0..400).map(|i| sample_point(&parent_bounds, i)).collect();
  let parent = batch(&parent_points, &[], parent_bounds.center.as_vec3());

  let octant = 5;
  let child_bounds = parent_bounds.child(octant);
  let own: Vec<_> = (0..50).map(|i| sample_point(&child_bounds, i)).collect();
  let slice = parent.octant(octant);
  assert!(!slice.is_empty());

  let child_center = child_bounds.center.as_vec3();
  let augmented = batch(&own, slice, child_center);
  assert_eq!(augmented.len(), own.len() + slice.len());
  assert_partition_consistent(&augmented, child_center);
  // every filler point lies inside the child's box
  for p in slice {
    assert!(child_bounds.contains_point(p.position.as_dvec3()));
  }
}

#[test]
fn test_batch_boundary_points_go_low() {
  let center = Vec3::splat(32.0);
  let on_center = point_at(32.0, 32.0, 32.0, 0);
  let above = point_at(32.5, 32.5, 32.5, 0);
  let batch = batch(&[on_center, above], &[], center);
  assert_eq!(batch.octant_count(0), 1);
  assert_eq!(batch.octant_count(7), 1);
}

#[test]
fn test_batch_empty() {
  let batch = batch(&[], &[], Vec3::ZERO);
  assert!(batch.is_empty());
  assert_eq!(batch.offsets, [0; 9]);
}

// ===== Batch 3: Post-loading =====

#[test]
fn test_intensity_range_mean_two_sigma() {
  let points: Vec<_> = [100u16, 200, 300].iter().map(|&i| point_at(0.0, 0.0, 0.0, i)).collect();
  let range = intensity_range(&points).unwrap();
  let sigma = (20_000.0f64 / 3.0).sqrt();
  assert!((range.min as f64 - (200.0 - 2.0 * sigma)).abs() < 1e-3);
  assert!((range.max as f64 - (200.0 + 2.0 * sigma)).abs() < 1e-3);
}

#[test]
fn test_intensity_range_clamped() {
  let points: Vec<_> = [0u16, 65535].iter().map(|&i| point_at(0.0, 0.0, 0.0, i)).collect();
  let range = intensity_range(&points).unwrap();
  assert_eq!(range.min, 0.0);
  assert_eq!(range.max, 65535.0);
  assert!(intensity_range(&[]).is_none());
}

#[test]
fn test_post_load_edges_and_optional_intensity() {
  let bounds = NodeBounds::from_min_max(DVec3::ZERO, DVec3::new(2.0, 4.0, 6.0));
  let own = vec![point_at(1.0, 1.0, 1.0, 10)];

  let with = post_load(&own, true, &bounds);
  assert_eq!(with.intensity_range.map(|r| r.min), Some(10.0));
  let without = post_load(&own, false, &bounds);
  assert!(without.intensity_range.is_none());

  assert_eq!(with.edges, bounds.edges());
  for p in with.edges {
    assert!(p.cmpge(Vec3::ZERO).all() && p.cmple(Vec3::new(2.0, 4.0, 6.0)).all());
  }
}
