//! Probe configuration: camera placement and streaming limits.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use pointcloud_stream::{CameraParams, StreamConfig, TraversalParams};

/// Root configuration for a probe run.
#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
  /// Directory holding `metadata.json` and the octree files.
  pub tree: String,
  pub camera: CameraConfig,
  #[serde(default)]
  pub traversal: TraversalConfig,
  #[serde(default)]
  pub run: RunConfig,
}

/// Perspective camera in display space (Y up).
#[derive(Debug, Deserialize)]
pub struct CameraConfig {
  pub eye: [f64; 3],
  pub target: [f64; 3],
  #[serde(default = "default_up")]
  pub up: [f64; 3],
  /// Vertical field of view in degrees.
  #[serde(default = "default_fov")]
  pub fov: f64,
  #[serde(default = "default_aspect")]
  pub aspect: f64,
  #[serde(default = "default_near")]
  pub near: f64,
  #[serde(default = "default_far")]
  pub far: f64,
}

#[derive(Debug, Deserialize)]
pub struct TraversalConfig {
  #[serde(default = "default_budget")]
  pub point_budget: u64,
  #[serde(default = "default_decay")]
  pub decay_xy: f64,
  #[serde(default = "default_decay")]
  pub decay_z: f64,
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
  /// Upper bound on ticks; the run stops early once settled.
  #[serde(default = "default_ticks")]
  pub max_ticks: u64,
  /// Run every job on the main thread.
  #[serde(default)]
  pub inline: bool,
  #[serde(default = "default_traverse_calls")]
  pub traverse_calls_per_tick: usize,
  #[serde(default = "default_max_pending")]
  pub max_pending_loads: usize,
}

fn default_up() -> [f64; 3] {
  [0.0, 1.0, 0.0]
}

fn default_fov() -> f64 {
  60.0
}

fn default_aspect() -> f64 {
  16.0 / 9.0
}

fn default_near() -> f64 {
  0.1
}

fn default_far() -> f64 {
  10_000.0
}

fn default_budget() -> u64 {
  TraversalParams::DEFAULT.point_budget
}

fn default_decay() -> f64 {
  0.5
}

fn default_ticks() -> u64 {
  1_000
}

fn default_traverse_calls() -> usize {
  StreamConfig::DEFAULT.traverse_calls_per_tick
}

fn default_max_pending() -> usize {
  StreamConfig::DEFAULT.max_pending_loads
}

impl Default for TraversalConfig {
  fn default() -> Self {
    Self {
      point_budget: default_budget(),
      decay_xy: default_decay(),
      decay_z: default_decay(),
    }
  }
}

impl Default for RunConfig {
  fn default() -> Self {
    Self {
      max_ticks: default_ticks(),
      inline: false,
      traverse_calls_per_tick: default_traverse_calls(),
      max_pending_loads: default_max_pending(),
    }
  }
}

impl ProbeConfig {
  /// Load configuration from a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: ProbeConfig =
      toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    let cam = &self.camera;
    if !(cam.fov > 0.0 && cam.fov < 180.0) {
      anyhow::bail!("camera.fov must be in (0, 180) degrees, got {}", cam.fov);
    }
    if cam.aspect <= 0.0 {
      anyhow::bail!("camera.aspect must be positive, got {}", cam.aspect);
    }
    if !(cam.near > 0.0 && cam.near < cam.far) {
      anyhow::bail!(
        "camera clip planes must satisfy 0 < near < far, got {} / {}",
        cam.near,
        cam.far
      );
    }
    if cam.eye == cam.target {
      anyhow::bail!("camera.eye and camera.target must differ");
    }
    for (name, decay) in [("decay_xy", self.traversal.decay_xy), ("decay_z", self.traversal.decay_z)] {
      if !(0.0..=1.0).contains(&decay) {
        anyhow::bail!("traversal.{} must be in [0, 1], got {}", name, decay);
      }
    }
    Ok(())
  }

  pub fn camera(&self) -> CameraParams {
    let cam = &self.camera;
    CameraParams::look_at(
      cam.eye.into(),
      cam.target.into(),
      cam.up.into(),
      cam.fov.to_radians(),
      cam.aspect,
      cam.near,
      cam.far,
    )
  }

  pub fn traversal(&self) -> TraversalParams {
    TraversalParams {
      point_budget: self.traversal.point_budget,
      decay_xy: self.traversal.decay_xy,
      decay_z: self.traversal.decay_z,
    }
  }

  pub fn stream(&self) -> StreamConfig {
    let base = if self.run.inline {
      StreamConfig::inline()
    } else {
      StreamConfig::DEFAULT
    };
    StreamConfig {
      traverse_calls_per_tick: self.run.traverse_calls_per_tick,
      max_pending_loads: self.run.max_pending_loads,
      ..base
    }
  }
}
