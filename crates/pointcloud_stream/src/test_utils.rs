//! Synthetic trees for tests.
//!
//! A fixture is a set of node names (`"r"`, `"r0"`, `"r04"`, ...) with points.
//! `write_to` emits `cloud.js`, one `.hrc` per page and one `.bin` per node,
//! laid out exactly as the catalog expects to read them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use glam::{DVec3, Vec3};

use crate::constants::AXIS_INDEX;
use crate::octree::{encode_page, NodeBounds, Octree};
use crate::source::{DataSource, MemorySource};
use crate::types::PointRecord;

pub const OCTREE_DIR: &str = "data";

#[derive(Clone, Debug)]
pub struct TreeFixture {
  pub version: &'static str,
  pub step_size: u32,
  pub spacing: f64,
  pub scale: f64,
  pub min: DVec3,
  pub size: f64,
  /// Write 0 counts so the loader derives them from file sizes.
  pub zero_counts: bool,
  pub nodes: BTreeMap<String, Vec<PointRecord>>,
}

impl TreeFixture {
  /// Cube `[0, 64]^3`, spacing 8, millimetre scale.
  pub fn new(step_size: u32) -> Self {
    Self {
      version: "1.7",
      step_size,
      spacing: 8.0,
      scale: 0.001,
      min: DVec3::ZERO,
      size: 64.0,
      zero_counts: false,
      nodes: BTreeMap::new(),
    }
  }

  pub fn version(mut self, version: &'static str) -> Self {
    self.version = version;
    self
  }

  pub fn zero_counts(mut self) -> Self {
    self.zero_counts = true;
    self
  }

  /// Adds `name` with `count` deterministic points spread over its box.
  pub fn node(mut self, name: &str, count: usize) -> Self {
    let bounds = self.bounds_of(name);
    let points = (0..count).map(|i| sample_point(&bounds, i)).collect();
    self.nodes.insert(name.to_string(), points);
    self
  }

  pub fn node_with_points(mut self, name: &str, points: Vec<PointRecord>) -> Self {
    self.nodes.insert(name.to_string(), points);
    self
  }

  /// Adds every node of a complete tree down to `depth` digits.
  pub fn full(mut self, depth: usize, count: usize) -> Self {
    let mut names = vec!["r".to_string()];
    let mut frontier = names.clone();
    for _ in 0..depth {
      let mut next = Vec::new();
      for name in &frontier {
        for o in 0..8 {
          next.push(format!("{name}{o}"));
        }
      }
      names.extend(next.iter().cloned());
      frontier = next;
    }
    for name in names {
      self = self.node(&name, count);
    }
    self
  }

  pub fn root_bounds(&self) -> NodeBounds {
    NodeBounds::from_min_max(self.min, self.min + DVec3::splat(self.size))
  }

  pub fn bounds_of(&self, name: &str) -> NodeBounds {
    name[1..]
      .bytes()
      .fold(self.root_bounds(), |b, digit| b.child(digit - b'0'))
  }

  pub fn stride(&self) -> usize {
    19
  }

  pub fn metadata_json(&self) -> String {
    let max = self.min + DVec3::splat(self.size);
    // display axis k is file component AXIS_INDEX[k]
    let mut lo = [0.0; 3];
    let mut hi = [0.0; 3];
    for k in 0..3 {
      lo[AXIS_INDEX[k]] = self.min[k];
      hi[AXIS_INDEX[k]] = max[k];
    }
    let attributes = if self.version == "1.8" {
      r#"[
        {"name": "POSITION_CARTESIAN", "size": 12, "elements": 3, "elementSize": 4, "type": "int32"},
        {"name": "RGBA", "size": 4, "elements": 4, "elementSize": 1, "type": "uint8"},
        {"name": "INTENSITY", "size": 2, "elements": 1, "elementSize": 2, "type": "uint16"},
        {"name": "CLASSIFICATION", "size": 1, "elements": 1, "elementSize": 1, "type": "uint8"}
      ]"#
        .to_string()
    } else {
      r#"["POSITION_CARTESIAN", "COLOR_PACKED", "INTENSITY", "CLASSIFICATION"]"#.to_string()
    };
    let total: usize = self.nodes.values().map(Vec::len).sum();
    format!(
      r#"{{
  "version": "{version}",
  "octreeDir": "{dir}",
  "projection": "",
  "points": {total},
  "boundingBox": {{"lx": {l0}, "ly": {l1}, "lz": {l2}, "ux": {u0}, "uy": {u1}, "uz": {u2}}},
  "tightBoundingBox": {{"lx": {l0}, "ly": {l1}, "lz": {l2}, "ux": {u0}, "uy": {u1}, "uz": {u2}}},
  "pointAttributes": {attributes},
  "spacing": {spacing},
  "scale": {scale},
  "hierarchyStepSize": {step}
}}"#,
      version = self.version,
      dir = OCTREE_DIR,
      l0 = lo[0],
      l1 = lo[1],
      l2 = lo[2],
      u0 = hi[0],
      u1 = hi[1],
      u2 = hi[2],
      spacing = self.spacing,
      scale = self.scale,
      step = self.step_size,
    )
  }

  /// Page root digits for a node with `digits` octant digits.
  fn page_root_len(&self, digits: usize) -> usize {
    let step = self.step_size as usize;
    digits / step * step
  }

  fn page_paths(&self, page_digits: &str) -> (String, String) {
    let step = self.step_size as usize;
    let mut sub_dir = "r/".to_string();
    for chunk in page_digits.as_bytes().chunks(step) {
      sub_dir.push_str(std::str::from_utf8(chunk).unwrap_or_default());
      sub_dir.push('/');
    }
    (sub_dir, format!("r{page_digits}"))
  }

  /// Every file of the tree as (relative path, bytes).
  pub fn files(&self) -> Vec<(String, Vec<u8>)> {
    let mut files = vec![("cloud.js".to_string(), self.metadata_json().into_bytes())];
    let step = self.step_size as usize;

    for (name, points) in &self.nodes {
      let digits = &name[1..];
      let page_digits = &digits[..self.page_root_len(digits.len())];
      let local = &digits[page_digits.len()..];
      let (sub_dir, prefix) = self.page_paths(page_digits);

      let bounds = self.bounds_of(name);
      let bin: Vec<u8> = points.iter().flat_map(|p| self.encode_point(&bounds, p)).collect();
      files.push((format!("{OCTREE_DIR}/{sub_dir}{prefix}{local}.bin"), bin));

      if local.is_empty() {
        let mut records = Vec::new();
        let mut queue = std::collections::VecDeque::from([name.clone()]);
        while let Some(current) = queue.pop_front() {
          let mut mask = 0u8;
          for o in 0..8u8 {
            let child = format!("{current}{o}");
            if self.nodes.contains_key(&child) {
              mask |= 1 << o;
              if child.len() - 1 - page_digits.len() < step {
                queue.push_back(child);
              }
            }
          }
          let count = if self.zero_counts { 0 } else { self.nodes[&current].len() as u32 };
          records.push((mask, count));
        }
        files.push((format!("{OCTREE_DIR}/{sub_dir}{prefix}.hrc"), encode_page(&records)));
      }
    }
    files
  }

  fn encode_point(&self, bounds: &NodeBounds, p: &PointRecord) -> Vec<u8> {
    let min = bounds.min();
    let mut file = [0u32; 3];
    for k in 0..3 {
      file[AXIS_INDEX[k]] = ((p.position[k] as f64 - min[k]) / self.scale).round().max(0.0) as u32;
    }
    let mut out = Vec::with_capacity(self.stride());
    for c in file {
      out.extend_from_slice(&c.to_le_bytes());
    }
    out.extend_from_slice(&p.color);
    out.extend_from_slice(&p.intensity().to_le_bytes());
    out.push(p.classification());
    out
  }

  pub fn write_to(&self, source: &MemorySource) {
    for (path, bytes) in self.files() {
      source.insert(path, bytes);
    }
  }

  pub fn memory_source(&self) -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::new());
    self.write_to(&source);
    source
  }

  pub fn write_dir(&self, root: &Path) {
    for (path, bytes) in self.files() {
      let full = root.join(&path);
      if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
      }
      std::fs::write(full, bytes).unwrap();
    }
  }

  /// Opens the fixture with the root page loaded.
  pub fn load(&self) -> Octree {
    let source: Arc<dyn DataSource> = self.memory_source();
    Octree::load_root(source).unwrap()
  }

  /// Opens the fixture with the root page unloaded.
  pub fn open(&self) -> Octree {
    let source: Arc<dyn DataSource> = self.memory_source();
    Octree::open(source).unwrap()
  }
}

/// Deterministic point `i` inside `bounds`, quantised to whole millimetres.
pub fn sample_point(bounds: &NodeBounds, i: usize) -> PointRecord {
  let f = |m: usize, p: usize| ((i * m + 1) % p) as f64 / p as f64;
  let min = bounds.min();
  let size = bounds.size();
  let raw = DVec3::new(
    min.x + size.x * f(37, 97),
    min.y + size.y * f(59, 89),
    min.z + size.z * f(71, 83),
  );
  let position = ((raw * 1000.0).round() / 1000.0).as_vec3();
  PointRecord {
    position,
    color: [(i % 256) as u8, 128, 64, 255],
    attributes: PointRecord::pack_attributes((i * 100 % 65536) as u16, (i % 5) as u8),
  }
}

pub fn approx_eq(a: Vec3, b: Vec3, eps: f32) -> bool {
  (a - b).abs().max_element() <= eps
}
