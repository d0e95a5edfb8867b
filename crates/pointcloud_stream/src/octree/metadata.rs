//! Tree metadata (`cloud.js`) and the per-point attribute layout.
//!
//! Two schemas are accepted. They differ only in `pointAttributes`:
//!
//! ```text
//! 1.7: "pointAttributes": ["POSITION_CARTESIAN", "COLOR_PACKED", "INTENSITY"]
//! 1.8: "pointAttributes": [{"name": "POSITION_CARTESIAN", "size": 12,
//!                           "elements": 3, "elementSize": 4, "type": "int32"}, ...]
//! ```
//!
//! Bounds in the file are Z-up and are converted to display space here.

use glam::DVec3;
use serde::Deserialize;

use super::NodeBounds;
use crate::constants::AXIS_INDEX;
use crate::error::MetadataError;

/// What a point attribute holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
  Position,
  Color,
  Intensity,
  Classification,
}

impl AttributeKind {
  fn expected_size(self) -> usize {
    match self {
      Self::Position => 12,
      Self::Color => 4,
      Self::Intensity => 2,
      Self::Classification => 1,
    }
  }

  fn label(self) -> &'static str {
    match self {
      Self::Position => "POSITION_CARTESIAN",
      Self::Color => "COLOR",
      Self::Intensity => "INTENSITY",
      Self::Classification => "CLASSIFICATION",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementType {
  Int32,
  UInt16,
  UInt8,
  Double,
}

impl ElementType {
  fn parse(name: &str) -> Result<Self, MetadataError> {
    match name {
      "int32" => Ok(Self::Int32),
      "uint16" => Ok(Self::UInt16),
      "uint8" => Ok(Self::UInt8),
      "double" => Ok(Self::Double),
      other => Err(MetadataError::UnknownElementType(other.to_string())),
    }
  }
}

/// One attribute inside a point record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointAttribute {
  pub kind: AttributeKind,
  pub size: usize,
  pub elements: usize,
  pub element_size: usize,
  pub element_type: ElementType,
  /// Byte offset inside the record.
  pub offset: usize,
}

/// Record layout shared by every point file of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointLayout {
  pub attributes: Vec<PointAttribute>,
  pub stride: usize,
}

impl PointLayout {
  /// Builds a layout with cumulative offsets; validates sizes.
  pub fn new(attributes: impl IntoIterator<Item = (AttributeKind, usize, usize, ElementType)>) -> Result<Self, MetadataError> {
    let mut offset = 0;
    let mut out = Vec::new();
    for (kind, elements, element_size, element_type) in attributes {
      let size = elements * element_size;
      if size != kind.expected_size() {
        return Err(MetadataError::AttributeSize {
          name: kind.label(),
          size,
          expected: kind.expected_size(),
        });
      }
      out.push(PointAttribute {
        kind,
        size,
        elements,
        element_size,
        element_type,
        offset,
      });
      offset += size;
    }
    let layout = Self {
      attributes: out,
      stride: offset,
    };
    if layout.position().is_none() {
      return Err(MetadataError::MissingPosition);
    }
    Ok(layout)
  }

  pub fn find(&self, kind: AttributeKind) -> Option<&PointAttribute> {
    self.attributes.iter().find(|a| a.kind == kind)
  }

  pub fn position(&self) -> Option<usize> {
    self.find(AttributeKind::Position).map(|a| a.offset)
  }

  pub fn color(&self) -> Option<usize> {
    self.find(AttributeKind::Color).map(|a| a.offset)
  }

  pub fn intensity(&self) -> Option<usize> {
    self.find(AttributeKind::Intensity).map(|a| a.offset)
  }

  pub fn classification(&self) -> Option<usize> {
    self.find(AttributeKind::Classification).map(|a| a.offset)
  }

  /// Offsets resolved for the parse loop.
  pub fn offsets(&self) -> AttributeOffsets {
    AttributeOffsets {
      position: self.position().unwrap_or(0),
      color: self.color(),
      intensity: self.intensity(),
      classification: self.classification(),
      stride: self.stride,
    }
  }
}

/// Flattened layout for the hot parse loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeOffsets {
  pub position: usize,
  pub color: Option<usize>,
  pub intensity: Option<usize>,
  pub classification: Option<usize>,
  pub stride: usize,
}

/// Parsed tree-level metadata, bounds already in display space.
#[derive(Clone, Debug)]
pub struct TreeMetadata {
  pub version: String,
  pub octree_dir: String,
  pub projection: String,
  pub points: u64,
  pub bounds: NodeBounds,
  pub tight_bounds: Option<NodeBounds>,
  pub spacing: f64,
  pub scale: f64,
  /// Depth span of one hierarchy page.
  pub step_size: u32,
  pub layout: PointLayout,
}

#[derive(Deserialize)]
struct VersionProbe {
  version: String,
}

#[derive(Deserialize)]
struct RawBox {
  lx: f64,
  ly: f64,
  lz: f64,
  ux: f64,
  uy: f64,
  uz: f64,
}

impl RawBox {
  /// File space is Z-up; display space swaps Y and Z.
  fn to_display(&self) -> NodeBounds {
    let lo = [self.lx, self.ly, self.lz];
    let hi = [self.ux, self.uy, self.uz];
    let min = DVec3::new(lo[AXIS_INDEX[0]], lo[AXIS_INDEX[1]], lo[AXIS_INDEX[2]]);
    let max = DVec3::new(hi[AXIS_INDEX[0]], hi[AXIS_INDEX[1]], hi[AXIS_INDEX[2]]);
    NodeBounds::from_min_max(min, max)
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescriptor {
  name: String,
  size: usize,
  elements: usize,
  element_size: usize,
  #[serde(rename = "type")]
  element_type: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAttributes {
  Names(Vec<String>),
  Descriptors(Vec<RawDescriptor>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCloud {
  version: String,
  octree_dir: String,
  #[serde(default)]
  projection: String,
  #[serde(default)]
  points: u64,
  bounding_box: RawBox,
  tight_bounding_box: Option<RawBox>,
  spacing: f64,
  scale: f64,
  hierarchy_step_size: u32,
  point_attributes: RawAttributes,
}

fn legacy_attribute(name: &str) -> Result<(AttributeKind, usize, usize, ElementType), MetadataError> {
  match name {
    "POSITION_CARTESIAN" => Ok((AttributeKind::Position, 3, 4, ElementType::Int32)),
    "COLOR_PACKED" => Ok((AttributeKind::Color, 4, 1, ElementType::UInt8)),
    "INTENSITY" => Ok((AttributeKind::Intensity, 1, 2, ElementType::UInt16)),
    "CLASSIFICATION" => Ok((AttributeKind::Classification, 1, 1, ElementType::UInt8)),
    other => Err(MetadataError::UnknownAttribute(other.to_string())),
  }
}

fn descriptor_attribute(raw: &RawDescriptor) -> Result<(AttributeKind, usize, usize, ElementType), MetadataError> {
  let kind = match raw.name.as_str() {
    "POSITION_CARTESIAN" => AttributeKind::Position,
    "RGBA" => AttributeKind::Color,
    "INTENSITY" => AttributeKind::Intensity,
    "CLASSIFICATION" => AttributeKind::Classification,
    other => return Err(MetadataError::UnknownAttribute(other.to_string())),
  };
  if raw.size != raw.elements * raw.element_size {
    return Err(MetadataError::MalformedDescriptor {
      name: raw.name.clone(),
      size: raw.size,
      elements: raw.elements,
      element_size: raw.element_size,
    });
  }
  Ok((kind, raw.elements, raw.element_size, ElementType::parse(&raw.element_type)?))
}

impl TreeMetadata {
  /// Parses and validates a metadata document. No partial result on error.
  pub fn from_json(bytes: &[u8]) -> Result<Self, MetadataError> {
    let probe: VersionProbe = serde_json::from_slice(bytes)?;
    if probe.version != "1.7" && probe.version != "1.8" {
      return Err(MetadataError::UnsupportedVersion(probe.version));
    }

    let raw: RawCloud = serde_json::from_slice(bytes)?;
    let attributes = match (&raw.point_attributes, raw.version.as_str()) {
      (RawAttributes::Names(names), "1.7") => names
        .iter()
        .map(|n| legacy_attribute(n))
        .collect::<Result<Vec<_>, _>>()?,
      (RawAttributes::Descriptors(descs), "1.8") => descs
        .iter()
        .map(descriptor_attribute)
        .collect::<Result<Vec<_>, _>>()?,
      (_, version) => return Err(MetadataError::SchemaMismatch(version.to_string())),
    };
    let layout = PointLayout::new(attributes)?;

    if raw.spacing.is_nan() || raw.spacing <= 0.0 {
      return Err(MetadataError::InvalidParameter {
        field: "spacing",
        value: raw.spacing,
      });
    }
    if raw.scale.is_nan() || raw.scale <= 0.0 {
      return Err(MetadataError::InvalidParameter {
        field: "scale",
        value: raw.scale,
      });
    }
    if raw.hierarchy_step_size == 0 {
      return Err(MetadataError::InvalidParameter {
        field: "hierarchyStepSize",
        value: 0.0,
      });
    }

    Ok(Self {
      version: raw.version,
      octree_dir: raw.octree_dir,
      projection: raw.projection,
      points: raw.points,
      bounds: raw.bounding_box.to_display(),
      tight_bounds: raw.tight_bounding_box.as_ref().map(RawBox::to_display),
      spacing: raw.spacing,
      scale: raw.scale,
      step_size: raw.hierarchy_step_size,
      layout,
    })
  }

  #[inline]
  pub fn stride(&self) -> usize {
    self.layout.stride
  }
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod metadata_test;
