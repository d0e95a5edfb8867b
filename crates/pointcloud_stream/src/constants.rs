//! Shared constants for tree layout, traversal pacing and record formats.

/// Component of a file-space (Z-up) coordinate read for display axis X.
pub const X_AXIS_INDEX: usize = 0;
/// Component of a file-space coordinate read for display axis Y (file Z).
pub const Y_AXIS_INDEX: usize = 2;
/// Component of a file-space coordinate read for display axis Z (file Y).
pub const Z_AXIS_INDEX: usize = 1;

/// Display axis -> file component lookup.
pub const AXIS_INDEX: [usize; 3] = [X_AXIS_INDEX, Y_AXIS_INDEX, Z_AXIS_INDEX];

/// Octant bit for each display axis: `1 << (2 - AXIS_INDEX[k])`.
pub const OCTANT_BIT: [u8; 3] = [
  1 << (2 - X_AXIS_INDEX),
  1 << (2 - Y_AXIS_INDEX),
  1 << (2 - Z_AXIS_INDEX),
];

/// Bytes per hierarchy record: one mask byte plus a u32 point count.
pub const HIERARCHY_RECORD_SIZE: usize = 5;

/// Nodes reprojected per call while walking the rendered-cut snapshot.
pub const RENDERED_CUT_CHUNK: usize = 64;
/// Nodes reprojected per call while walking the traversal snapshot.
pub const TRAVERSAL_CHUNK: usize = 128;

/// Priority assigned to the root when traversal starts.
pub const ROOT_PRIORITY: f64 = f32::MAX as f64;

/// Sentinel point count of a structurally empty child.
pub const GHOST_POINT_COUNT: i64 = -1;

/// Root page directory fragment.
pub const ROOT_SUB_DIR: &str = "r/";
/// Root page node-name prefix.
pub const ROOT_PREFIX: &str = "r";

/// Hierarchy page file extension.
pub const PAGE_EXTENSION: &str = "hrc";
/// Point data file extension.
pub const POINT_EXTENSION: &str = "bin";

/// Tree metadata file name inside the tree directory.
pub const METADATA_FILE: &str = "cloud.js";

/// Corner pairs (by bit-decomposed corner index) forming the 12 box edges.
pub const BOX_EDGES: [(usize, usize); 12] = [
  (0, 1),
  (2, 3),
  (4, 5),
  (6, 7),
  (0, 2),
  (1, 3),
  (4, 6),
  (5, 7),
  (0, 4),
  (1, 5),
  (2, 6),
  (3, 7),
];
