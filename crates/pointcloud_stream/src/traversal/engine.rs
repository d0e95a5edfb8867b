//! Incremental, budgeted traversal of the octree.
//!
//! ```text
//!   Initiate -> ReprojectRenderedCut -> ReprojectTraversal -> Traversal
//!      ^                                                          |
//!      +---------------- camera / budget change ------------------+
//! ```
//!
//! Each `traverse(n)` call does one bounded unit of work for the current
//! stage, so a tick's cost does not depend on tree size.
//!
//! Queue membership per node:
//! - traversal queue only: candidate, not displayed
//! - rendered-cut queue: displayed, some children are candidates
//! - neither: displayed ancestor whose children are all displayed

use std::collections::VecDeque;

use super::events::TraversalEvent;
use super::params::TraversalParams;
use super::priority::PriorityModel;
use crate::constants::{RENDERED_CUT_CHUNK, ROOT_PRIORITY, TRAVERSAL_CHUNK};
use crate::culling::CameraParams;
use crate::octree::{NodeFlags, NodeId, Octree, PageState};
use crate::priority_queue::IndexedPriorityQueue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraversalStage {
  #[default]
  Initiate,
  ReprojectRenderedCut,
  ReprojectTraversal,
  Traversal,
}

pub struct TraversalEngine {
  stage: TraversalStage,
  /// Candidates, highest priority on top.
  traversal: IndexedPriorityQueue<NodeId, f64>,
  /// Displayed frontier, lowest priority on top.
  rendered: IndexedPriorityQueue<NodeId, f64>,
  reproject: VecDeque<NodeId>,
  model: PriorityModel,
  camera: CameraParams,
  params: TraversalParams,
  /// Bumped on every camera or falloff change.
  epoch: u64,
  point_count: u64,
  pending_pages: usize,
  events: Vec<TraversalEvent>,
  root: Option<NodeId>,
}

impl TraversalEngine {
  pub fn new(camera: &CameraParams, params: TraversalParams) -> Self {
    Self {
      stage: TraversalStage::Initiate,
      traversal: IndexedPriorityQueue::new_max(),
      rendered: IndexedPriorityQueue::new_min(),
      reproject: VecDeque::new(),
      model: PriorityModel::new(camera, &params),
      camera: *camera,
      params,
      epoch: 1,
      point_count: 0,
      pending_pages: 0,
      events: Vec::new(),
      root: None,
    }
  }

  /// Seeds the traversal queue with the root.
  pub fn init(&mut self, octree: &mut Octree) {
    let root = octree.root();
    octree.node_mut(root).priority = ROOT_PRIORITY;
    self.add_to_traversal(octree, root, ROOT_PRIORITY);
    self.root = Some(root);
    self.stage = TraversalStage::Initiate;
  }

  /// Invalidates every cached priority and restarts from `Initiate`.
  pub fn set_camera(&mut self, camera: &CameraParams) {
    self.camera = *camera;
    self.model = PriorityModel::new(camera, &self.params);
    self.epoch += 1;
    self.stage = TraversalStage::Initiate;
  }

  /// Budget changes restart the cycle; falloff changes also invalidate priorities.
  pub fn set_params(&mut self, params: TraversalParams) {
    if params.projection_differs(&self.params) {
      self.params = params;
      let camera = self.camera;
      self.set_camera(&camera);
      return;
    }
    if params.point_budget != self.params.point_budget {
      self.stage = TraversalStage::Initiate;
    }
    self.params = params;
  }

  #[inline]
  pub fn stage(&self) -> TraversalStage {
    self.stage
  }

  #[inline]
  pub fn camera(&self) -> &CameraParams {
    &self.camera
  }

  #[inline]
  pub fn params(&self) -> &TraversalParams {
    &self.params
  }

  /// Summed point count of displayed internal nodes.
  #[inline]
  pub fn point_count(&self) -> u64 {
    self.point_count
  }

  #[inline]
  pub fn pending_pages(&self) -> usize {
    self.pending_pages
  }

  pub fn traversal_len(&self) -> usize {
    self.traversal.len()
  }

  pub fn rendered_len(&self) -> usize {
    self.rendered.len()
  }

  /// Nodes currently on the rendered cut, in heap order.
  pub fn rendered_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.rendered.iter().map(|(&id, _)| id)
  }

  pub fn traversal_nodes(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
    self.traversal.iter().map(|(&id, &p)| (id, p))
  }

  pub fn drain_events(&mut self) -> Vec<TraversalEvent> {
    std::mem::take(&mut self.events)
  }

  /// True once another `traverse` call in this frame cannot change anything.
  pub fn is_settled(&self, octree: &Octree) -> bool {
    if self.stage != TraversalStage::Traversal {
      return false;
    }
    if self.point_count > self.params.point_budget && !self.rendered.is_empty() {
      return false;
    }
    let Some((_, &node, &queued)) = self.traversal.peek_entry() else {
      return true;
    };
    if queued <= 0.0 && self.pending_pages == 0 {
      return true;
    }
    let n = octree.node(node);
    let at_budget = self.point_count + n.budget_points() > self.params.point_budget;
    let maximized = self.rendered.peek_priority().map_or(true, |&p| p >= n.priority);
    at_budget && maximized
  }

  /// Does up to one unit of work for the current stage.
  ///
  /// In the traversal stage `iterations` bounds how many queue heads are
  /// examined. Paying back a lowered budget is not counted and finishes
  /// within the call.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "traversal::traverse"))]
  pub fn traverse(&mut self, octree: &mut Octree, iterations: usize) {
    match self.stage {
      TraversalStage::Initiate => {
        self.reproject.clear();
        self.reproject.extend(self.rendered.iter().map(|(&id, _)| id));
        self.stage = TraversalStage::ReprojectRenderedCut;
      }
      TraversalStage::ReprojectRenderedCut => {
        for _ in 0..RENDERED_CUT_CHUNK {
          let Some(node) = self.reproject.pop_front() else {
            break;
          };
          if !octree.node(node).has_flag(NodeFlags::ON_RENDERED_CUT) {
            continue;
          }
          let priority = self.project(octree, node);
          if priority <= 0.0 {
            self.remove_node(octree, node);
          } else if let Some(handle) = octree.node(node).queue_handle {
            self.rendered.update_priority(handle, priority);
          }
        }
        if self.reproject.is_empty() {
          self.reproject.extend(self.traversal.iter().map(|(&id, _)| id));
          self.stage = TraversalStage::ReprojectTraversal;
        }
      }
      TraversalStage::ReprojectTraversal => {
        for _ in 0..TRAVERSAL_CHUNK {
          let Some(node) = self.reproject.pop_front() else {
            break;
          };
          if !octree.node(node).has_flag(NodeFlags::IN_TRAVERSAL) {
            continue;
          }
          let priority = self.project(octree, node);
          if let Some(handle) = octree.node(node).queue_handle {
            self.traversal.update_priority(handle, priority);
          }
        }
        if self.reproject.is_empty() {
          self.stage = TraversalStage::Traversal;
        }
      }
      TraversalStage::Traversal => self.traverse_queue(octree, iterations),
    }
  }

  fn traverse_queue(&mut self, octree: &mut Octree, mut iterations: usize) {
    // A lowered budget is paid back in full before anything new is admitted.
    while self.point_count > self.params.point_budget {
      let Some(&victim) = self.rendered.peek() else {
        break;
      };
      self.remove_node(octree, victim);
    }

    while iterations > 0 {
      let Some((handle, &node, &queued)) = self.traversal.peek_entry() else {
        return;
      };
      if queued <= 0.0 {
        return;
      }
      iterations -= 1;

      match octree.page_state(node) {
        PageState::Loaded => {}
        PageState::Unloaded => {
          self.traversal.update_priority(handle, 0.0);
          let n = octree.node_mut(node);
          if !n.has_flag(NodeFlags::PAGE_LOADING) {
            n.flags.insert(NodeFlags::PAGE_LOADING);
            self.pending_pages += 1;
            self.events.push(TraversalEvent::PageRequested(node));
            log::trace!("page requested for {}", n.name);
          }
          return;
        }
        PageState::Failed => {
          self.traversal.update_priority(handle, 0.0);
          continue;
        }
      }

      let (count, priority) = {
        let n = octree.node(node);
        (n.budget_points(), n.priority)
      };
      if self.point_count + count > self.params.point_budget {
        match self.rendered.peek_entry().map(|(_, &id, &p)| (id, p)) {
          Some((victim, victim_priority)) if victim_priority < priority => {
            self.remove_node(octree, victim);
            continue;
          }
          _ => return,
        }
      }

      self.add_node(octree, node);
    }
  }

  /// Page load for `node`'s page finished (the page is already installed on success).
  pub fn page_loaded(&mut self, octree: &mut Octree, node: NodeId, success: bool) {
    let n = octree.node_mut(node);
    if n.has_flag(NodeFlags::PAGE_LOADING) {
      n.flags.remove(NodeFlags::PAGE_LOADING);
      self.pending_pages = self.pending_pages.saturating_sub(1);
    }
    if !success {
      n.priority = 0.0;
    }
    if n.has_flag(NodeFlags::IN_TRAVERSAL) {
      if let Some(handle) = n.queue_handle {
        let priority = n.priority;
        self.traversal.update_priority(handle, priority);
      }
    }
  }

  /// Priority of `node` for the current epoch, computed at most once per epoch.
  ///
  /// Clamped to the parent's stored priority and mirrored into the parent's
  /// culling mask.
  fn project(&mut self, octree: &mut Octree, node: NodeId) -> f64 {
    let n = octree.node(node);
    if n.projected_epoch == self.epoch {
      return n.priority;
    }

    let mut priority = if octree.page_state(node) == PageState::Failed {
      0.0
    } else {
      self.model.priority(&n.bounds, n.spacing)
    };
    let parent = n.parent;
    let octant = n.octant;
    let on_cut = n.has_flag(NodeFlags::ON_RENDERED_CUT);

    if let Some(parent) = parent {
      let p = octree.node_mut(parent);
      priority = priority.min(p.priority);
      let before = p.culling_mask;
      if priority > 0.0 {
        p.culling_mask.set(octant);
      } else {
        p.culling_mask.clear(octant);
      }
      if p.culling_mask != before {
        self.events.push(TraversalEvent::CullingMaskChanged(parent));
      }
    }

    let n = octree.node_mut(node);
    n.priority = priority;
    n.projected_epoch = self.epoch;
    if on_cut {
      self.events.push(TraversalEvent::PriorityChanged(node));
    }
    priority
  }

  fn add_to_traversal(&mut self, octree: &mut Octree, node: NodeId, priority: f64) {
    debug_assert!(
      !octree.node(node).has_flag(NodeFlags::ON_RENDERED_CUT),
      "{} entering traversal while on the rendered cut",
      octree.node(node).name
    );
    let handle = self.traversal.enqueue(node, priority);
    let n = octree.node_mut(node);
    n.queue_handle = Some(handle);
    n.flags.insert(NodeFlags::IN_TRAVERSAL);
    let (parent, octant) = (n.parent, n.octant);
    if let Some(parent) = parent {
      octree.node_mut(parent).traversal_mask.set(octant);
    }
  }

  fn remove_from_traversal(&mut self, octree: &mut Octree, node: NodeId) {
    let n = octree.node_mut(node);
    if let Some(handle) = n.queue_handle.take() {
      self.traversal.remove(handle);
    }
    n.flags.remove(NodeFlags::IN_TRAVERSAL);
    let (parent, octant) = (n.parent, n.octant);

    if let Some(parent) = parent {
      let p = octree.node_mut(parent);
      p.traversal_mask.clear(octant);
      if p.traversal_mask.is_empty() && p.has_flag(NodeFlags::ON_RENDERED_CUT) {
        self.remove_from_rendered(octree, parent);
      }
    }
  }

  fn add_to_rendered(&mut self, octree: &mut Octree, node: NodeId, priority: f64) {
    debug_assert!(
      !octree.node(node).has_flag(NodeFlags::IN_TRAVERSAL),
      "{} entering the rendered cut while in traversal",
      octree.node(node).name
    );
    let handle = self.rendered.enqueue(node, priority);
    let n = octree.node_mut(node);
    n.queue_handle = Some(handle);
    n.flags.insert(NodeFlags::ON_RENDERED_CUT);
  }

  fn remove_from_rendered(&mut self, octree: &mut Octree, node: NodeId) {
    let n = octree.node_mut(node);
    if let Some(handle) = n.queue_handle.take() {
      self.rendered.remove(handle);
    }
    n.flags.remove(NodeFlags::ON_RENDERED_CUT);
  }

  /// Promotes a candidate to displayed and enqueues its children.
  fn add_node(&mut self, octree: &mut Octree, node: NodeId) {
    self.remove_from_traversal(octree, node);
    let priority = octree.node(node).priority;
    self.add_to_rendered(octree, node, priority);
    octree.node_mut(node).flags.insert(NodeFlags::ADMITTED);

    let Some(children) = octree.node(node).children else {
      return;
    };
    self.point_count += octree.node(node).budget_points();
    self.events.push(TraversalEvent::NodeAdded(node));
    log::trace!("admitted {} ({} points displayed)", octree.node(node).name, self.point_count);

    for child in children {
      let priority = self.project(octree, child);
      self.add_to_traversal(octree, child, priority);
    }
  }

  /// Evicts `node` together with the zero-priority chain above it.
  fn remove_node(&mut self, octree: &mut Octree, node: NodeId) {
    let mut top = node;
    while let Some(parent) = octree.node(top).parent {
      if self.project(octree, parent) > 0.0 {
        break;
      }
      top = parent;
    }

    self.tear_down(octree, top);

    if let Some(parent) = octree.node(top).parent {
      if !octree.node(parent).has_flag(NodeFlags::ON_RENDERED_CUT) {
        let priority = self.project(octree, parent);
        self.add_to_rendered(octree, parent, priority);
      }
    }
    let priority = octree.node(top).priority;
    self.add_to_traversal(octree, top, priority);
  }

  /// Breadth-first release of everything displayed at or below `top`.
  fn tear_down(&mut self, octree: &mut Octree, top: NodeId) {
    let mut queue = VecDeque::from([top]);
    while let Some(current) = queue.pop_front() {
      let n = octree.node(current);
      if n.has_flag(NodeFlags::IN_TRAVERSAL) {
        self.remove_from_traversal(octree, current);
        continue;
      }
      if n.has_flag(NodeFlags::ON_RENDERED_CUT) && n.is_ghost() {
        self.remove_from_rendered(octree, current);
      }

      let n = octree.node_mut(current);
      n.flags.remove(NodeFlags::ADMITTED);
      if let Some(children) = n.children {
        if octree.page_state(current) == PageState::Loaded {
          let count = octree.node(current).budget_points();
          debug_assert!(self.point_count >= count, "negative budget headroom");
          self.point_count = self.point_count.saturating_sub(count);
          self.events.push(TraversalEvent::NodeRemoved(current));
          queue.extend(children);
        }
      }
    }
  }

  /// Tears down every displayed node and empties both queues.
  pub fn dispose(&mut self, octree: &mut Octree) {
    if let Some(root) = self.root.take() {
      if !octree.node(root).has_flag(NodeFlags::IN_TRAVERSAL) {
        self.tear_down(octree, root);
      }
    }
    for (id, _) in self.traversal.iter().chain(self.rendered.iter()) {
      let n = octree.node_mut(*id);
      n.queue_handle = None;
      n.flags.remove(NodeFlags::IN_TRAVERSAL);
      n.flags.remove(NodeFlags::ON_RENDERED_CUT);
    }
    for id in octree.node_ids().collect::<Vec<_>>() {
      let n = octree.node_mut(id);
      n.traversal_mask = crate::octree::OctantMask::EMPTY;
      n.flags.remove(NodeFlags::ADMITTED);
    }
    self.traversal.clear();
    self.rendered.clear();
    self.reproject.clear();
    self.point_count = 0;
    self.stage = TraversalStage::Initiate;
  }

  /// Checks queue membership and budget bookkeeping. For tests and debugging.
  pub fn check_invariants(&self, octree: &Octree) -> Result<(), String> {
    let mut displayed_points = 0u64;
    for id in octree.node_ids() {
      let n = octree.node(id);
      let in_traversal = n.has_flag(NodeFlags::IN_TRAVERSAL);
      let on_cut = n.has_flag(NodeFlags::ON_RENDERED_CUT);
      if in_traversal && on_cut {
        return Err(format!("{} is in both queues", n.name));
      }
      if in_traversal != n.queue_handle.map_or(false, |h| self.traversal.contains(h)) {
        return Err(format!("{} traversal flag disagrees with queue", n.name));
      }
      if on_cut != n.queue_handle.map_or(false, |h| self.rendered.contains(h)) {
        return Err(format!("{} rendered flag disagrees with queue", n.name));
      }
      if n.has_flag(NodeFlags::ADMITTED) {
        if !n.is_leaf() {
          displayed_points += n.budget_points();
          if on_cut && n.traversal_mask.is_empty() {
            return Err(format!("{} is on the rendered cut with no queued children", n.name));
          }
        } else if !on_cut {
          return Err(format!("displayed leaf {} is in neither queue", n.name));
        }
      }
    }
    if displayed_points != self.point_count {
      return Err(format!(
        "point counter {} != displayed total {}",
        self.point_count, displayed_points
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
