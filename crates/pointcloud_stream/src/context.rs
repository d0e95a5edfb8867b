//! The per-tick coordinator.
//!
//! [`TraversalContext`] owns the octree, the traversal engine, the point load
//! pipeline and the page loader. The caller's loop invokes [`step`] once per
//! tick; everything that mutates node state happens inside it, on the
//! calling thread.
//!
//! ```text
//!  step():
//!    apply params ─► drain pages ─► drain point loads ─► traverse (budgeted)
//!         ─► engine events ─► dispatch pages ─► pump load stages
//! ```
//!
//! Camera and budget changes from other threads go through a
//! [`ParamHandle`] and are applied at the start of the next tick.
//!
//! [`step`]: TraversalContext::step

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use web_time::Instant;

use crate::culling::CameraParams;
use crate::error::PageError;
use crate::metrics::StreamMetrics;
use crate::octree::{NodeBounds, NodeFlags, NodeId, OctantMask, Octree, PageLayout, PageState, SubtreeId};
use crate::pipeline::{LoadOutcome, LoadPipeline};
use crate::threading::{ExecutionMode, TaskExecutor};
use crate::traversal::{TraversalEngine, TraversalEvent, TraversalParams, TraversalStage};
use crate::types::{DisplayStats, PartitionedPoints};

/// What the renderer gets to see of a displayed node.
#[derive(Clone, Copy, Debug)]
pub struct NodeView<'a> {
  pub id: NodeId,
  pub name: &'a str,
  pub bounds: NodeBounds,
  /// Augmented points, bucketed by octant.
  pub points: &'a PartitionedPoints,
  /// Octants the renderer should draw from this node.
  pub render_mask: OctantMask,
  pub stats: Option<&'a DisplayStats>,
}

impl<'a> NodeView<'a> {
  fn of(octree: &'a Octree, id: NodeId) -> Option<Self> {
    let node = octree.node(id);
    Some(Self {
      id,
      name: &node.name,
      bounds: node.bounds,
      points: node.points.as_ref()?,
      render_mask: node.render_mask(),
      stats: node.stats.as_ref(),
    })
  }
}

/// Receives display changes. Called synchronously from [`TraversalContext::step`].
pub trait RenderListener {
  /// The node's points are ready and should be drawn.
  fn node_visible(&mut self, node: &NodeView<'_>);

  /// The node left the working set. Its points are released after this returns.
  fn node_hidden(&mut self, node: &NodeView<'_>);

  /// The render mask of a visible node changed.
  fn render_mask_changed(&mut self, node: &NodeView<'_>);
}

impl RenderListener for () {
  fn node_visible(&mut self, _: &NodeView<'_>) {}
  fn node_hidden(&mut self, _: &NodeView<'_>) {}
  fn render_mask_changed(&mut self, _: &NodeView<'_>) {}
}

/// Per-tick work limits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamConfig {
  /// `traverse` calls per tick.
  pub traverse_calls_per_tick: usize,
  /// Queue heads examined per `traverse` call.
  pub iterations_per_call: usize,
  /// Traversal pauses while more point loads than this are pending.
  pub max_pending_loads: usize,
  /// Load stages handed to workers per tick.
  pub max_stage_dispatch_per_tick: usize,
  pub max_page_loads_in_flight: usize,
  pub execution: ExecutionMode,
}

impl StreamConfig {
  pub const DEFAULT: Self = Self {
    traverse_calls_per_tick: 10,
    iterations_per_call: 1,
    max_pending_loads: 10,
    max_stage_dispatch_per_tick: 16,
    max_page_loads_in_flight: 1,
    execution: ExecutionMode::Pool,
  };

  /// Defaults, with every job run on the calling thread.
  pub fn inline() -> Self {
    Self {
      execution: ExecutionMode::Inline,
      ..Self::DEFAULT
    }
  }
}

impl Default for StreamConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// What one [`TraversalContext::step`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickStats {
  pub tick: u64,
  pub stage: TraversalStage,
  /// Traversal ran this tick (it is skipped when settled or back-pressured).
  pub traversed: bool,
  pub settled: bool,
  pub point_count: u64,
  pub visible_nodes: usize,
  pub pending_pages: usize,
  pub pending_loads: usize,
  pub nodes_added: usize,
  pub nodes_removed: usize,
  pub pages_loaded: usize,
  pub pages_failed: usize,
  pub loads_completed: usize,
  pub loads_failed: usize,
  pub elapsed_us: u64,
}

#[derive(Default)]
struct PendingParams {
  camera: Option<CameraParams>,
  params: Option<TraversalParams>,
}

fn lock(inbox: &Mutex<PendingParams>) -> MutexGuard<'_, PendingParams> {
  inbox.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe way to change camera and traversal parameters.
///
/// The latest value of each wins and is applied at the start of the next tick.
#[derive(Clone)]
pub struct ParamHandle {
  inbox: Arc<Mutex<PendingParams>>,
}

impl ParamHandle {
  pub fn set_camera(&self, camera: CameraParams) {
    lock(&self.inbox).camera = Some(camera);
  }

  pub fn set_params(&self, params: TraversalParams) {
    lock(&self.inbox).params = Some(params);
  }
}

struct PageCompletion {
  node: NodeId,
  subtree: SubtreeId,
  result: Result<PageLayout, PageError>,
}

pub struct TraversalContext<L: RenderListener> {
  octree: Octree,
  engine: TraversalEngine,
  pipeline: LoadPipeline,
  pages: TaskExecutor<PageCompletion>,
  /// Page roots whose page is wanted but not yet dispatched.
  page_requests: VecDeque<NodeId>,
  listener: L,
  config: StreamConfig,
  inbox: Arc<Mutex<PendingParams>>,
  metrics: StreamMetrics,
  visible_nodes: usize,
  tick: u64,
  disposed: bool,
}

impl<L: RenderListener> TraversalContext<L> {
  pub fn init(
    mut octree: Octree,
    listener: L,
    config: StreamConfig,
    camera: CameraParams,
    params: TraversalParams,
  ) -> Self {
    let mut engine = TraversalEngine::new(&camera, params);
    engine.init(&mut octree);
    log::debug!(
      "traversal context over {:?} (budget {}, {:?})",
      octree,
      params.point_budget,
      config.execution
    );
    Self {
      octree,
      engine,
      pipeline: LoadPipeline::new(config.execution, config.max_stage_dispatch_per_tick),
      pages: TaskExecutor::new(config.execution),
      page_requests: VecDeque::new(),
      listener,
      config,
      inbox: Arc::new(Mutex::new(PendingParams::default())),
      metrics: StreamMetrics::new(),
      visible_nodes: 0,
      tick: 0,
      disposed: false,
    }
  }

  /// Handle for changing parameters from other threads.
  pub fn handle(&self) -> ParamHandle {
    ParamHandle {
      inbox: Arc::clone(&self.inbox),
    }
  }

  /// Runs one bounded tick.
  ///
  /// `camera` and `params` override anything queued through a [`ParamHandle`].
  /// Passing values equal to the current ones is free.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "context::step"))]
  pub fn step(&mut self, camera: Option<&CameraParams>, params: Option<TraversalParams>) -> TickStats {
    let start = Instant::now();
    self.tick += 1;
    let mut stats = TickStats {
      tick: self.tick,
      ..Default::default()
    };
    if self.disposed {
      return stats;
    }

    self.apply_params(camera, params);
    self.drain_pages(&mut stats);
    self.drain_loads(&mut stats);

    if !self.engine.is_settled(&self.octree) && self.pipeline.pending_count() <= self.config.max_pending_loads {
      #[cfg(feature = "tracing")]
      let _span = tracing::info_span!("traverse_calls").entered();
      stats.traversed = true;
      for _ in 0..self.config.traverse_calls_per_tick {
        self.engine.traverse(&mut self.octree, self.config.iterations_per_call);
        if self.engine.is_settled(&self.octree) {
          break;
        }
      }
    }

    self.process_events(&mut stats);
    self.dispatch_pages();
    self.pipeline.pump(&self.octree);

    stats.stage = self.engine.stage();
    stats.settled = self.engine.is_settled(&self.octree);
    stats.point_count = self.engine.point_count();
    stats.visible_nodes = self.visible_nodes;
    stats.pending_pages = self.pending_page_loads();
    stats.pending_loads = self.pending_node_loads();
    stats.elapsed_us = start.elapsed().as_micros() as u64;
    let worker_us = self.pipeline.take_worker_time_us();
    self.metrics.record_tick(&stats, worker_us);
    stats
  }

  fn apply_params(&mut self, camera: Option<&CameraParams>, params: Option<TraversalParams>) {
    let queued = std::mem::take(&mut *lock(&self.inbox));
    if let Some(params) = params.or(queued.params) {
      if params != *self.engine.params() {
        log::debug!("traversal params changed: {:?}", params);
        self.engine.set_params(params);
      }
    }
    if let Some(camera) = camera.copied().or(queued.camera) {
      if camera != *self.engine.camera() {
        self.engine.set_camera(&camera);
      }
    }
  }

  fn drain_pages(&mut self, stats: &mut TickStats) {
    for PageCompletion { node, subtree, result } in self.pages.drain() {
      match result {
        Ok(layout) => {
          if self.octree.subtree(subtree).state == PageState::Unloaded {
            self.octree.install_page(subtree, layout);
          }
          self.engine.page_loaded(&mut self.octree, node, true);
          stats.pages_loaded += 1;
        }
        Err(err) => {
          log::warn!("{}", err);
          self.octree.fail_page(subtree);
          self.engine.page_loaded(&mut self.octree, node, false);
          stats.pages_failed += 1;
        }
      }
    }
  }

  fn drain_loads(&mut self, stats: &mut TickStats) {
    for outcome in self.pipeline.drain(&mut self.octree) {
      match outcome {
        LoadOutcome::Loaded(node) => {
          stats.loads_completed += 1;
          if self.octree.node(node).has_flag(NodeFlags::ADMITTED) {
            self.show(node);
          } else {
            self.release(node);
          }
        }
        LoadOutcome::Failed { .. } => stats.loads_failed += 1,
      }
    }
  }

  fn process_events(&mut self, stats: &mut TickStats) {
    for event in self.engine.drain_events() {
      match event {
        TraversalEvent::NodeAdded(node) => {
          stats.nodes_added += 1;
          let priority = self.octree.node(node).priority;
          self.pipeline.request(node, priority);
        }
        TraversalEvent::NodeRemoved(node) => {
          stats.nodes_removed += 1;
          self.pipeline.cancel(node);
          self.hide(node);
        }
        TraversalEvent::CullingMaskChanged(node) => self.notify_mask(node),
        TraversalEvent::PriorityChanged(node) => {
          let priority = self.octree.node(node).priority;
          self.pipeline.update_priority(node, priority);
        }
        TraversalEvent::PageRequested(node) => self.page_requests.push_back(node),
      }
    }
  }

  fn dispatch_pages(&mut self) {
    while self.pages.pending_count() < self.config.max_page_loads_in_flight {
      let Some(node) = self.page_requests.pop_front() else {
        break;
      };
      let id = self.octree.node(node).subtree;
      let subtree = self.octree.subtree(id).clone();
      if subtree.state != PageState::Unloaded {
        self.engine.page_loaded(&mut self.octree, node, subtree.is_loaded());
        continue;
      }
      log::debug!("loading page {}", self.octree.page_file_path(id));
      let meta = Arc::clone(self.octree.metadata());
      let source = Arc::clone(self.octree.source());
      self.pages.spawn(move || PageCompletion {
        node,
        subtree: id,
        result: subtree.read(&meta, source.as_ref()),
      });
    }
  }

  /// Makes a freshly loaded node visible and updates its parent's mask.
  fn show(&mut self, node: NodeId) {
    let n = self.octree.node(node);
    if n.points.is_none() {
      log::warn!("{} finished loading without points, not shown", n.name);
      self.release(node);
      return;
    }
    let mut inheritance = n.descendant_mask;
    if let Some(children) = n.children {
      for (octant, child) in children.iter().enumerate() {
        if self.octree.node(*child).visible {
          inheritance.clear(octant as u8);
        }
      }
    }
    let n = self.octree.node_mut(node);
    n.inheritance_mask = inheritance;
    n.visible = true;
    n.notified_mask = n.render_mask();
    let (parent, octant) = (n.parent, n.octant);
    self.visible_nodes += 1;

    if let Some(view) = NodeView::of(&self.octree, node) {
      self.listener.node_visible(&view);
    }
    log::trace!("{} visible", self.octree.node(node).name);

    if let Some(parent) = parent {
      if self.octree.node(parent).visible {
        self.octree.node_mut(parent).inheritance_mask.clear(octant);
        self.notify_mask(parent);
      }
    }
  }

  /// Hides `node` if visible and drops its points.
  fn hide(&mut self, node: NodeId) {
    let n = self.octree.node(node);
    if n.visible {
      if let Some(view) = NodeView::of(&self.octree, node) {
        self.listener.node_hidden(&view);
      }
      self.visible_nodes = self.visible_nodes.saturating_sub(1);
      self.octree.node_mut(node).visible = false;

      let n = self.octree.node(node);
      if let Some(parent) = n.parent {
        let octant = n.octant;
        let p = self.octree.node_mut(parent);
        if p.visible && p.descendant_mask.contains(octant) {
          p.inheritance_mask.set(octant);
          self.notify_mask(parent);
        }
      }
    }
    self.release(node);
  }

  fn release(&mut self, node: NodeId) {
    let n = self.octree.node_mut(node);
    n.points = None;
    n.stats = None;
    n.inheritance_mask = OctantMask::EMPTY;
    n.notified_mask = OctantMask::EMPTY;
  }

  /// Tells the renderer about a changed render mask of a visible node.
  fn notify_mask(&mut self, node: NodeId) {
    let n = self.octree.node_mut(node);
    if !n.visible || n.render_mask() == n.notified_mask {
      return;
    }
    n.notified_mask = n.render_mask();
    if let Some(view) = NodeView::of(&self.octree, node) {
      self.listener.render_mask_changed(&view);
    }
  }

  /// Hides everything, cancels all loads and resets the engine.
  ///
  /// Later `step` calls do nothing.
  pub fn dispose(&mut self) {
    if self.disposed {
      return;
    }
    self.engine.dispose(&mut self.octree);
    let mut stats = TickStats::default();
    self.process_events(&mut stats);
    self.pipeline.cancel_all();
    self.page_requests.clear();

    for id in self.octree.node_ids().collect::<Vec<_>>() {
      if self.octree.node(id).visible {
        self.hide(id);
      } else if self.octree.node(id).points.is_some() {
        self.release(id);
      }
    }
    self.disposed = true;
    log::debug!("traversal context disposed after {} ticks", self.tick);
  }

  #[inline]
  pub fn is_disposed(&self) -> bool {
    self.disposed
  }

  /// Pages requested and not yet installed.
  pub fn pending_page_loads(&self) -> usize {
    self.page_requests.len() + self.pages.pending_count()
  }

  /// Point loads the traversal is waiting on.
  pub fn pending_node_loads(&self) -> usize {
    self.pipeline.pending_count()
  }

  pub fn visible_nodes(&self) -> usize {
    self.visible_nodes
  }

  pub fn octree(&self) -> &Octree {
    &self.octree
  }

  pub fn engine(&self) -> &TraversalEngine {
    &self.engine
  }

  pub fn pipeline(&self) -> &LoadPipeline {
    &self.pipeline
  }

  pub fn config(&self) -> &StreamConfig {
    &self.config
  }

  pub fn metrics(&self) -> &StreamMetrics {
    &self.metrics
  }

  pub fn listener(&self) -> &L {
    &self.listener
  }

  pub fn listener_mut(&mut self) -> &mut L {
    &mut self.listener
  }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod context_test;
