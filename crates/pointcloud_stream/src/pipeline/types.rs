//! Job bookkeeping shared by the load pipeline stages.

use std::sync::Arc;

use crate::error::PointDataError;
use crate::octree::NodeId;
use crate::priority_queue::QueueHandle;
use crate::types::{DisplayStats, PartitionedPoints, PointRecord};

/// Stage a point job is in (or about to run).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStage {
  /// Fetching the node's point file.
  Reading,
  /// Decoding fixed-stride records.
  Parsing,
  /// Parsed, but the parent's points are not materialised yet.
  WaitingForParentPoints,
  /// Partitioning own points plus the parent's octant slice.
  Batching,
  /// Intensity window and wireframe edges.
  PostLoading,
}

/// Lifecycle state of a point job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
  Loading,
  /// The traversal no longer wants the node. In-flight work is discarded.
  Cancelled,
}

/// Coordinator-side record of one node's load.
#[derive(Debug)]
pub struct LoadJob {
  pub node: NodeId,
  pub stage: JobStage,
  pub state: JobState,
  pub priority: f64,
  /// Distinguishes this job's completions from an earlier job for the same node.
  pub ticket: u64,
  /// A stage of this job is running on a worker.
  pub in_flight: bool,
  pub(crate) queue_handle: Option<QueueHandle>,
  pub(crate) bytes: Option<Arc<Vec<u8>>>,
  /// Own (non-augmented) points, kept for post-loading.
  pub(crate) own_points: Option<Arc<[PointRecord]>>,
}

impl LoadJob {
  pub(crate) fn new(node: NodeId, priority: f64, ticket: u64) -> Self {
    Self {
      node,
      stage: JobStage::Reading,
      state: JobState::Loading,
      priority,
      ticket,
      in_flight: false,
      queue_handle: None,
      bytes: None,
      own_points: None,
    }
  }

  #[inline]
  pub fn is_cancelled(&self) -> bool {
    self.state == JobState::Cancelled
  }
}

/// Result of one stage, produced on a worker.
#[derive(Debug)]
pub(crate) enum StageOutput {
  Read(Result<Vec<u8>, PointDataError>),
  Parsed(Result<Vec<PointRecord>, PointDataError>),
  Batched(PartitionedPoints),
  PostLoaded(DisplayStats),
}

/// Stage output tagged with the job it belongs to.
#[derive(Debug)]
pub(crate) struct StageCompletion {
  pub node: NodeId,
  pub ticket: u64,
  pub output: StageOutput,
  pub elapsed_us: u64,
}

/// Final result of a job, reported to the context.
#[derive(Debug)]
pub enum LoadOutcome {
  /// Points and stats are installed on the node.
  Loaded(NodeId),
  /// Reading or parsing failed. The node stays without points.
  Failed { node: NodeId, error: PointDataError },
}

impl LoadOutcome {
  pub fn node(&self) -> NodeId {
    match self {
      LoadOutcome::Loaded(node) => *node,
      LoadOutcome::Failed { node, .. } => *node,
    }
  }
}
