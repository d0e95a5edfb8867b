//! Coordinator side of the point load pipeline.
//!
//! Jobs wait in an indexed priority queue and are dispatched highest
//! priority first, at most `max_dispatch` stages per `pump`. Each stage
//! runs on the executor; `drain` commits finished stages on the coordinator
//! and queues the next one.
//!
//! ```text
//!  request ──► Reading ──► Parsing ──┬──────────────────────────► Batching ──► PostLoading ──► Loaded
//!                                    │                               ▲
//!                                    └─► WaitingForParentPoints ─────┘
//!                                        (parent batched or gone)
//! ```
//!
//! Cancellation is advisory. A cancelled job is dropped at the next stage
//! boundary and whatever its worker produced is thrown away.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use web_time::Instant;

use super::stages::{batch, parse_points, post_load, read_points};
use super::types::{JobStage, JobState, LoadJob, LoadOutcome, StageCompletion, StageOutput};
use crate::octree::{NodeId, Octree};
use crate::priority_queue::IndexedPriorityQueue;
use crate::threading::{ExecutionMode, TaskExecutor};
use crate::types::PointRecord;

/// What a batching job can expect from its parent.
enum ParentPoints {
  /// The parent's octant slice for this node.
  Ready(Arc<[PointRecord]>, Range<usize>),
  /// The parent is still loading; wait for it.
  Pending,
  /// Root node, or a parent that will not produce points.
  Absent,
}

pub struct LoadPipeline {
  jobs: HashMap<NodeId, LoadJob>,
  /// Jobs whose next stage is ready to dispatch.
  queue: IndexedPriorityQueue<NodeId, f64>,
  executor: TaskExecutor<StageCompletion>,
  max_dispatch: usize,
  next_ticket: u64,
  /// Worker time of stages drained since the last `take_worker_time_us`.
  worker_time_us: u64,
}

impl LoadPipeline {
  pub fn new(mode: ExecutionMode, max_dispatch: usize) -> Self {
    Self {
      jobs: HashMap::new(),
      queue: IndexedPriorityQueue::new_max(),
      executor: TaskExecutor::new(mode),
      max_dispatch: max_dispatch.max(1),
      next_ticket: 0,
      worker_time_us: 0,
    }
  }

  /// Starts loading `node`, or refreshes the priority of its existing job.
  ///
  /// A cancelled job still in flight is revived instead of restarted.
  pub fn request(&mut self, node: NodeId, priority: f64) {
    if let Some(job) = self.jobs.get_mut(&node) {
      job.state = JobState::Loading;
      job.priority = priority;
      if let Some(handle) = job.queue_handle {
        self.queue.update_priority(handle, priority);
      }
      return;
    }

    let ticket = self.next_ticket;
    self.next_ticket += 1;
    let mut job = LoadJob::new(node, priority, ticket);
    job.queue_handle = Some(self.queue.enqueue(node, priority));
    self.jobs.insert(node, job);
  }

  /// Drops the job for `node`. Returns false when there was none.
  pub fn cancel(&mut self, node: NodeId) -> bool {
    let Some(job) = self.jobs.get_mut(&node) else {
      return false;
    };
    if let Some(handle) = job.queue_handle.take() {
      self.queue.remove(handle);
    }
    if job.in_flight {
      job.state = JobState::Cancelled;
    } else {
      self.jobs.remove(&node);
    }
    true
  }

  pub fn cancel_all(&mut self) {
    let nodes: Vec<NodeId> = self.jobs.keys().copied().collect();
    for node in nodes {
      self.cancel(node);
    }
  }

  pub fn update_priority(&mut self, node: NodeId, priority: f64) {
    if let Some(job) = self.jobs.get_mut(&node) {
      job.priority = priority;
      if let Some(handle) = job.queue_handle {
        self.queue.update_priority(handle, priority);
      }
    }
  }

  /// Hands up to `max_dispatch` queued stages to the executor.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "pipeline::pump"))]
  pub fn pump(&mut self, octree: &Octree) -> usize {
    let mut dispatched = 0;
    while dispatched < self.max_dispatch {
      let Some((node, _)) = self.queue.dequeue() else {
        break;
      };
      let Some(stage) = self.jobs.get_mut(&node).map(|job| {
        job.queue_handle = None;
        job.stage
      }) else {
        continue;
      };

      let parent = if stage == JobStage::Batching {
        self.parent_points(octree, node)
      } else {
        ParentPoints::Absent
      };

      let Some(job) = self.jobs.get_mut(&node) else {
        continue;
      };
      let ticket = job.ticket;
      match stage {
        JobStage::Reading => {
          let source = Arc::clone(octree.source());
          let path = octree.point_file_path(node);
          spawn_stage(&self.executor, node, ticket, move || {
            StageOutput::Read(read_points(source.as_ref(), &path))
          });
        }
        JobStage::Parsing => {
          let Some(bytes) = job.bytes.take() else {
            debug_assert!(false, "parsing job without bytes");
            job.stage = JobStage::Reading;
            job.queue_handle = Some(self.queue.enqueue(node, job.priority));
            continue;
          };
          let meta = Arc::clone(octree.metadata());
          let min = octree.node(node).bounds.min();
          let path = octree.point_file_path(node);
          spawn_stage(&self.executor, node, ticket, move || {
            let offsets = meta.layout.offsets();
            StageOutput::Parsed(parse_points(&bytes, &offsets, min, meta.scale, &path))
          });
        }
        JobStage::Batching => {
          let own = job.own_points.clone().unwrap_or_else(|| Arc::from(Vec::new()));
          let center = octree.node(node).bounds.center.as_vec3();
          let parent = match parent {
            ParentPoints::Ready(points, range) => Some((points, range)),
            ParentPoints::Absent => None,
            ParentPoints::Pending => {
              log::trace!("{} parked until its parent is batched", octree.node(node).name);
              job.stage = JobStage::WaitingForParentPoints;
              continue;
            }
          };
          spawn_stage(&self.executor, node, ticket, move || {
            let slice = parent.as_ref().map_or(&[][..], |(points, range)| &points[range.clone()]);
            StageOutput::Batched(batch(&own, slice, center))
          });
        }
        JobStage::PostLoading => {
          let own = job.own_points.clone().unwrap_or_else(|| Arc::from(Vec::new()));
          let has_intensity = octree.metadata().layout.intensity().is_some();
          let bounds = octree.node(node).bounds;
          spawn_stage(&self.executor, node, ticket, move || {
            StageOutput::PostLoaded(post_load(&own, has_intensity, &bounds))
          });
        }
        JobStage::WaitingForParentPoints => continue,
      }
      job.in_flight = true;
      dispatched += 1;
    }
    dispatched
  }

  /// Commits finished stages and returns the jobs that completed or failed.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "pipeline::drain"))]
  pub fn drain(&mut self, octree: &mut Octree) -> Vec<LoadOutcome> {
    let mut outcomes = Vec::new();
    for completion in self.executor.drain() {
      let StageCompletion {
        node,
        ticket,
        output,
        elapsed_us,
      } = completion;
      self.worker_time_us += elapsed_us;

      let Some(mut job) = self.jobs.remove(&node) else {
        continue;
      };
      if job.ticket != ticket {
        self.jobs.insert(node, job);
        continue;
      }
      job.in_flight = false;
      if job.is_cancelled() {
        log::trace!("dropped cancelled load of {}", octree.node(node).name);
        continue;
      }

      match output {
        StageOutput::Read(Ok(bytes)) => {
          job.bytes = Some(Arc::new(bytes));
          job.stage = JobStage::Parsing;
        }
        StageOutput::Read(Err(error)) | StageOutput::Parsed(Err(error)) => {
          log::warn!("loading {} failed: {}", octree.node(node).name, error);
          self.resume_children(octree, node);
          outcomes.push(LoadOutcome::Failed { node, error });
          continue;
        }
        StageOutput::Parsed(Ok(points)) => {
          job.own_points = Some(Arc::from(points));
          job.stage = match self.parent_points(octree, node) {
            ParentPoints::Pending => JobStage::WaitingForParentPoints,
            _ => JobStage::Batching,
          };
        }
        StageOutput::Batched(points) => {
          octree.node_mut(node).points = Some(points);
          job.stage = JobStage::PostLoading;
        }
        StageOutput::PostLoaded(_) if octree.node(node).points.is_none() => {
          // Released while cancelled, then revived. Rebuild from the parsed points.
          log::trace!("re-batching revived load of {}", octree.node(node).name);
          job.stage = JobStage::Batching;
        }
        StageOutput::PostLoaded(stats) => {
          octree.node_mut(node).stats = Some(stats);
          outcomes.push(LoadOutcome::Loaded(node));
          continue;
        }
      }

      let batched = job.stage == JobStage::PostLoading;
      if job.stage != JobStage::WaitingForParentPoints {
        job.queue_handle = Some(self.queue.enqueue(node, job.priority));
      }
      self.jobs.insert(node, job);
      if batched {
        self.resume_children(octree, node);
      }
    }
    outcomes
  }

  /// Moves parked children of `parent` straight to batching.
  fn resume_children(&mut self, octree: &Octree, parent: NodeId) {
    let Some(children) = octree.node(parent).children else {
      return;
    };
    for child in children {
      let Some(job) = self.jobs.get_mut(&child) else {
        continue;
      };
      if job.stage == JobStage::WaitingForParentPoints && !job.is_cancelled() {
        job.stage = JobStage::Batching;
        job.queue_handle = Some(self.queue.enqueue(child, job.priority));
      }
    }
  }

  fn parent_points(&self, octree: &Octree, node: NodeId) -> ParentPoints {
    let n = octree.node(node);
    let Some(parent) = n.parent else {
      return ParentPoints::Absent;
    };
    if let Some(points) = &octree.node(parent).points {
      let o = n.octant as usize;
      let range = points.offsets[o] as usize..points.offsets[o + 1] as usize;
      return ParentPoints::Ready(Arc::clone(&points.points), range);
    }
    match self.jobs.get(&parent) {
      Some(job) if !job.is_cancelled() => ParentPoints::Pending,
      _ => ParentPoints::Absent,
    }
  }

  pub fn job(&self, node: NodeId) -> Option<&LoadJob> {
    self.jobs.get(&node)
  }

  pub fn stage_of(&self, node: NodeId) -> Option<JobStage> {
    self.jobs.get(&node).map(|job| job.stage)
  }

  pub fn state_of(&self, node: NodeId) -> Option<JobState> {
    self.jobs.get(&node).map(|job| job.state)
  }

  /// Jobs the traversal still wants.
  pub fn pending_count(&self) -> usize {
    self.jobs.values().filter(|job| !job.is_cancelled()).count()
  }

  /// Stages running on workers or waiting to be drained.
  pub fn in_flight_count(&self) -> usize {
    self.executor.pending_count()
  }

  pub fn queued_count(&self) -> usize {
    self.queue.len()
  }

  pub fn is_idle(&self) -> bool {
    self.jobs.is_empty() && self.executor.is_idle()
  }

  pub fn take_worker_time_us(&mut self) -> u64 {
    std::mem::take(&mut self.worker_time_us)
  }
}

fn spawn_stage<F>(executor: &TaskExecutor<StageCompletion>, node: NodeId, ticket: u64, work: F)
where
  F: FnOnce() -> StageOutput + Send + 'static,
{
  executor.spawn(move || {
    let start = Instant::now();
    let output = work();
    StageCompletion {
      node,
      ticket,
      output,
      elapsed_us: start.elapsed().as_micros() as u64,
    }
  });
}

#[cfg(test)]
#[path = "load_test.rs"]
mod load_test;
