//! Error taxonomy.
//!
//! Only tree-open failures reach the caller. Page and point failures that
//! happen while streaming are handled by the coordinator and surface as
//! counters in [`crate::context::TickStats`].

use thiserror::Error;

/// Malformed or unsupported tree metadata. Fatal at open time.
#[derive(Debug, Error)]
pub enum MetadataError {
  #[error("unsupported metadata version {0:?}")]
  UnsupportedVersion(String),

  #[error("pointAttributes encoding does not match version {0}")]
  SchemaMismatch(String),

  #[error("unknown point attribute {0:?}")]
  UnknownAttribute(String),

  #[error("unsupported attribute element type {0:?}")]
  UnknownElementType(String),

  #[error("attribute {name}: size {size} != {elements} elements x {element_size} bytes")]
  MalformedDescriptor {
    name: String,
    size: usize,
    elements: usize,
    element_size: usize,
  },

  #[error("attribute {name} has size {size}, expected {expected}")]
  AttributeSize {
    name: &'static str,
    size: usize,
    expected: usize,
  },

  #[error("point layout has no position attribute")]
  MissingPosition,

  #[error("invalid tree parameter {field}: {value}")]
  InvalidParameter { field: &'static str, value: f64 },

  #[error("metadata is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),
}

/// Failure to read or decode a hierarchy page.
#[derive(Debug, Error)]
pub enum PageError {
  #[error("page {path} has {len} bytes, not a multiple of the record size")]
  Misaligned { path: String, len: usize },

  #[error("page {path} ended after {records} records while nodes were still pending")]
  Truncated { path: String, records: usize },

  #[error("page {path} is empty")]
  Empty { path: String },

  #[error("reading {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Failure to read or decode a node's point file.
#[derive(Debug, Error)]
pub enum PointDataError {
  #[error("point file {path} has {len} bytes, not a multiple of stride {stride}")]
  Misaligned {
    path: String,
    len: usize,
    stride: usize,
  },

  #[error("reading {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

/// Errors returned when opening a tree.
#[derive(Debug, Error)]
pub enum StreamError {
  #[error(transparent)]
  Metadata(#[from] MetadataError),

  #[error(transparent)]
  Page(#[from] PageError),

  #[error("reading tree metadata {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
