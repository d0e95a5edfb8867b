//! pointcloud_stream - out-of-core point cloud octree streaming
//!
//! Streams a paged point-cloud octree into a budget-constrained,
//! frustum-prioritised working set for real-time display.
//!
//! # Components
//!
//! - **Indexed priority queue**: binary heap with generation-checked handles
//!   for O(log n) update and removal anywhere in the heap
//! - **Frustum culler**: projected-hull versus viewport test
//! - **Octree catalog**: tree metadata, lazily paged hierarchy, node arena
//! - **Traversal engine**: incremental, budgeted state machine that decides
//!   which nodes are displayed
//! - **Load pipeline**: staged Reading → Parsing → Batching → PostLoading
//!   point jobs executed off the coordinator
//! - **Traversal context**: per-tick driver tying the above together and
//!   notifying an external renderer
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pointcloud_stream::{
//!   CameraParams, DirectorySource, Octree, StreamConfig, TraversalContext, TraversalParams,
//! };
//!
//! let octree = Octree::open(Arc::new(DirectorySource::new("tree")))?;
//! let camera = CameraParams::look_at(eye, target, up, fov, aspect, 0.1, 1000.0);
//! let mut context = TraversalContext::init(
//!   octree,
//!   MyRenderer::default(),
//!   StreamConfig::DEFAULT,
//!   camera,
//!   TraversalParams::with_budget(2_000_000),
//! );
//!
//! loop {
//!   let stats = context.step(Some(&camera_this_frame), None);
//! }
//! ```

pub mod constants;
pub mod error;
pub mod reader;
pub mod source;
pub mod types;

// Indexed heap shared by traversal and job dispatch
pub mod priority_queue;
pub use priority_queue::{IndexedPriorityQueue, QueueHandle};

// Visibility
pub mod culling;
pub use culling::{CameraParams, FrustumCuller};

// Paged hierarchy
pub mod octree;
pub use octree::{NodeBounds, NodeId, Octree, OctreeNode, PageState, TreeMetadata};

// Budgeted traversal state machine
pub mod traversal;
pub use traversal::{TraversalEngine, TraversalEvent, TraversalParams, TraversalStage};

// Staged point loading
pub mod pipeline;
pub use pipeline::{JobStage, JobState, LoadOutcome, LoadPipeline};

// Worker execution
pub mod threading;
pub use threading::{ExecutionMode, TaskExecutor};

// Per-tick driver and renderer boundary
pub mod context;
pub use context::{NodeView, ParamHandle, RenderListener, StreamConfig, TickStats, TraversalContext};

pub mod metrics;

pub use error::{MetadataError, PageError, PointDataError, StreamError};
pub use source::{DataSource, DirectorySource, MemorySource};
pub use types::{DisplayStats, IntensityRange, PartitionedPoints, PointRecord};

#[cfg(test)]
pub(crate) mod test_utils;
