//! Point Load Pipeline
//!
//! Turns a displayed node's point file into an augmented, octant-partitioned
//! batch ready for the renderer.
//!
//! # Stages
//!
//! 1. **Reading**: fetch the point file from the tree's data source
//! 2. **Parsing**: decode fixed-stride records into display-space points
//! 3. **Batching**: bucket own points plus the parent's octant slice by
//!    octant; parks in `WaitingForParentPoints` while the parent is loading
//! 4. **PostLoading**: intensity display window and wireframe edges
//!
//! Stage work runs on a [`TaskExecutor`](crate::threading::TaskExecutor);
//! all node mutation happens in [`LoadPipeline::drain`] on the coordinator.

pub mod load;
pub mod stages;
pub mod types;

pub use load::LoadPipeline;
pub use stages::{batch, intensity_range, parse_points, post_load, read_points};
pub use types::{JobStage, JobState, LoadJob, LoadOutcome};
