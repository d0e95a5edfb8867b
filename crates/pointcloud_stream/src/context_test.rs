use std::collections::BTreeMap;
use std::sync::Arc;

use glam::DVec3;

use super::*;
use crate::source::DataSource;
use crate::test_utils::TreeFixture;

#[derive(Default)]
struct Recorder {
  /// Visible node name -> last render mask seen.
  visible: BTreeMap<String, u8>,
  points: BTreeMap<String, usize>,
  shown: Vec<String>,
  hidden: Vec<String>,
  mask_changes: usize,
}

impl RenderListener for Recorder {
  fn node_visible(&mut self, node: &NodeView<'_>) {
    assert!(!self.visible.contains_key(node.name), "{} shown twice", node.name);
    self.visible.insert(node.name.to_string(), node.render_mask.bits());
    self.points.insert(node.name.to_string(), node.points.len());
    self.shown.push(node.name.to_string());
  }

  fn node_hidden(&mut self, node: &NodeView<'_>) {
    assert!(self.visible.remove(node.name).is_some(), "{} hidden while not shown", node.name);
    self.points.remove(node.name);
    self.hidden.push(node.name.to_string());
  }

  fn render_mask_changed(&mut self, node: &NodeView<'_>) {
    assert!(self.visible.contains_key(node.name));
    self.visible.insert(node.name.to_string(), node.render_mask.bits());
    self.mask_changes += 1;
  }
}

fn camera_at(eye: DVec3, target: DVec3) -> CameraParams {
  CameraParams::look_at(eye, target, DVec3::Y, 60f64.to_radians(), 1.0, 0.1, 1000.0)
}

fn overview() -> CameraParams {
  camera_at(DVec3::new(32.0, 32.0, 200.0), DVec3::splat(32.0))
}

fn looking_away() -> CameraParams {
  camera_at(DVec3::new(200.0, 32.0, 32.0), DVec3::new(400.0, 32.0, 32.0))
}

fn context(octree: Octree, config: StreamConfig, budget: u64) -> TraversalContext<Recorder> {
  TraversalContext::init(
    octree,
    Recorder::default(),
    config,
    overview(),
    TraversalParams::with_budget(budget),
  )
}

/// Steps until traversal is settled and nothing is loading.
fn settle(ctx: &mut TraversalContext<Recorder>) -> Vec<TickStats> {
  let mut ticks = Vec::new();
  for _ in 0..300 {
    let stats = ctx.step(None, None);
    ctx.engine().check_invariants(ctx.octree()).unwrap();
    ticks.push(stats);
    if stats.settled && stats.pending_loads == 0 && stats.pending_pages == 0 && ctx.pipeline().is_idle() {
      return ticks;
    }
  }
  panic!("context did not settle");
}

// ===== Batch 1: First ticks =====

#[test]
fn test_first_ticks_load_page_then_admit_root() {
  let mut fixture = TreeFixture::new(5).node("r", 600);
  for o in 0..8 {
    fixture = fixture.node(&format!("r{o}"), 500);
  }
  fixture.spacing = 10.0;
  let octree = fixture.open();
  let camera = camera_at(DVec3::new(32.0, 32.0, 132.0), DVec3::splat(32.0));
  let mut ctx = TraversalContext::init(
    octree,
    Recorder::default(),
    StreamConfig::inline(),
    camera,
    TraversalParams::with_budget(1000),
  );
  let root = ctx.octree().root();

  // Tick 1: the root page is requested and nothing is displayed.
  let stats = ctx.step(None, None);
  assert_eq!(stats.pending_pages, 1);
  assert_eq!(stats.nodes_added, 0);
  assert_eq!(ctx.engine().rendered_len(), 0);
  assert_eq!(ctx.octree().page_state(root), PageState::Unloaded);

  // Tick 2: page installed, root on the rendered cut, children queued.
  let stats = ctx.step(None, None);
  assert_eq!(stats.pages_loaded, 1);
  assert_eq!(stats.nodes_added, 1);
  assert_eq!(ctx.engine().rendered_nodes().collect::<Vec<_>>(), vec![root]);
  let root_priority = ctx.octree().node(root).priority;
  let queued: Vec<(NodeId, f64)> = ctx.engine().traversal_nodes().collect();
  assert_eq!(queued.len(), 8);
  for (child, priority) in queued {
    assert_eq!(ctx.octree().node(child).parent, Some(root));
    assert!(priority > 0.0 && priority <= root_priority);
  }
  assert_eq!(ctx.engine().point_count(), 600);
  assert_eq!(ctx.pending_node_loads(), 1);

  settle(&mut ctx);
  assert_eq!(ctx.listener().shown, vec!["r".to_string()]);
  assert_eq!(ctx.listener().points["r"], 600);
}

// ===== Batch 2: Working set and masks =====

#[test]
fn test_full_tree_becomes_visible() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  settle(&mut ctx);

  let recorder = ctx.listener();
  assert_eq!(recorder.visible.len(), 9);
  assert_eq!(ctx.visible_nodes(), 9);
  assert_eq!(recorder.shown[0], "r");
  assert_eq!(recorder.points["r"], 20);
  for o in 0..8 {
    let name = format!("r{o}");
    // own points plus the root's filler for this octant
    assert!(recorder.points[&name] >= 20);
    assert_eq!(recorder.visible[&name], 0, "{name} has no data below it");
  }
  // Every child is displayed, so the root draws nothing itself.
  assert_eq!(recorder.visible["r"], 0);
  assert!(recorder.mask_changes >= 8);
  assert_eq!(ctx.octree().node(ctx.octree().root()).render_mask(), OctantMask::EMPTY);
  assert_eq!(ctx.engine().point_count(), 180);
}

#[test]
fn test_augmented_points_partitioned() {
  let fixture = TreeFixture::new(5).full(1, 30);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  settle(&mut ctx);

  let octree = ctx.octree();
  for id in octree.node_ids() {
    let node = octree.node(id);
    let Some(points) = &node.points else {
      continue;
    };
    assert_eq!(points.offsets[8] as usize, points.len());
    let center = node.bounds.center.as_vec3();
    for o in 0..8u8 {
      for p in points.octant(o) {
        assert_eq!(crate::octree::octant_of(center, p.position), o);
      }
    }
  }
}

#[test]
fn test_camera_from_other_thread_hides_everything() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  settle(&mut ctx);
  assert_eq!(ctx.visible_nodes(), 9);

  let handle = ctx.handle();
  std::thread::spawn(move || handle.set_camera(looking_away()))
    .join()
    .unwrap();

  let stats = ctx.step(None, None);
  assert_eq!(stats.nodes_removed, 9);
  assert_eq!(ctx.visible_nodes(), 0);
  assert!(ctx.listener().visible.is_empty());
  assert_eq!(ctx.listener().hidden.len(), 9);
  assert_eq!(ctx.engine().point_count(), 0);
  let octree = ctx.octree();
  assert!(octree.node_ids().all(|id| octree.node(id).points.is_none()));

  // Looking back brings the same set back.
  let back = overview();
  ctx.step(Some(&back), None);
  settle(&mut ctx);
  assert_eq!(ctx.visible_nodes(), 9);
}

#[test]
fn test_budget_shrink_restores_parent_mask() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  settle(&mut ctx);
  assert_eq!(ctx.listener().visible["r"], 0);

  ctx.step(None, Some(TraversalParams::with_budget(30)));
  settle(&mut ctx);

  assert_eq!(ctx.engine().point_count(), 20);
  let recorder = ctx.listener();
  assert_eq!(recorder.visible.keys().collect::<Vec<_>>(), vec!["r"]);
  assert_eq!(recorder.hidden.len(), 8);
  // All children hidden and in view: the root draws every octant again.
  assert_eq!(recorder.visible["r"], 0xFF);
}

// ===== Batch 3: Back-pressure and failures =====

#[test]
fn test_traversal_waits_for_pending_loads() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let config = StreamConfig {
    max_pending_loads: 0,
    ..StreamConfig::inline()
  };
  let mut ctx = context(fixture.open(), config, 10_000);

  ctx.step(None, None);
  let admitted = ctx.step(None, None);
  assert!(admitted.traversed);
  assert!(admitted.nodes_added > 0);

  let blocked = ctx.step(None, None);
  assert!(!blocked.traversed);
  assert!(!blocked.settled);
  assert!(blocked.pending_loads > 0);

  settle(&mut ctx);
  assert_eq!(ctx.visible_nodes(), 9);
}

#[test]
fn test_failed_root_page_is_not_retried() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let source = fixture.memory_source();
  source.remove("data/r/r.hrc");
  let source: Arc<dyn DataSource> = source;
  let mut ctx = context(Octree::open(source).unwrap(), StreamConfig::inline(), 10_000);
  let root = ctx.octree().root();

  ctx.step(None, None);
  let stats = ctx.step(None, None);
  assert_eq!(stats.pages_failed, 1);
  assert_eq!(ctx.octree().page_state(root), PageState::Failed);

  let ticks = settle(&mut ctx);
  assert!(ticks.iter().all(|t| t.pages_failed == 0 && t.pages_loaded == 0));
  assert_eq!(ctx.visible_nodes(), 0);
  assert_eq!(ctx.octree().node(root).priority, 0.0);
}

#[test]
fn test_missing_point_file_leaves_node_hidden() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let source = fixture.memory_source();
  source.remove("data/r/r6.bin");
  let source: Arc<dyn DataSource> = source;
  let mut ctx = context(Octree::open(source).unwrap(), StreamConfig::inline(), 10_000);

  let ticks = settle(&mut ctx);
  assert_eq!(ticks.iter().map(|t| t.loads_failed).sum::<usize>(), 1);
  assert_eq!(ctx.visible_nodes(), 8);
  assert!(!ctx.listener().visible.contains_key("r6"));
  // The root keeps drawing the missing child's octant.
  assert_eq!(ctx.listener().visible["r"], 1 << 6);
}

#[test]
fn test_show_without_points_keeps_node_hidden() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  let root = ctx.octree().root();
  assert!(ctx.octree().node(root).points.is_none());

  ctx.show(root);

  let node = ctx.octree().node(root);
  assert!(!node.visible);
  assert_eq!(node.notified_mask, OctantMask::EMPTY);
  assert_eq!(ctx.visible_nodes(), 0);
  assert!(ctx.listener().shown.is_empty());
}

// ===== Batch 4: Lifecycle =====

#[test]
fn test_dispose_hides_everything() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  settle(&mut ctx);

  ctx.dispose();
  assert!(ctx.is_disposed());
  assert_eq!(ctx.visible_nodes(), 0);
  assert!(ctx.listener().visible.is_empty());
  assert_eq!(ctx.listener().hidden.len(), 9);
  assert_eq!(ctx.engine().point_count(), 0);
  assert_eq!(ctx.engine().stage(), TraversalStage::Initiate);
  assert_eq!(ctx.pending_node_loads(), 0);

  let stats = ctx.step(Some(&overview()), None);
  assert!(!stats.traversed);
  assert_eq!(ctx.visible_nodes(), 0);
}

#[test]
fn test_dispose_mid_load_cancels_jobs() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::inline(), 10_000);
  ctx.step(None, None);
  ctx.step(None, None);
  assert!(ctx.pending_node_loads() > 0);

  ctx.dispose();
  assert_eq!(ctx.pending_node_loads(), 0);
  assert!(ctx.listener().shown.is_empty());
}

#[test]
fn test_pool_execution_reaches_same_working_set() {
  let fixture = TreeFixture::new(5).full(1, 20);
  let mut ctx = context(fixture.open(), StreamConfig::DEFAULT, 10_000);

  for _ in 0..20_000 {
    let stats = ctx.step(None, None);
    if stats.settled && stats.pending_loads == 0 && stats.pending_pages == 0 && ctx.pipeline().is_idle() {
      break;
    }
    std::thread::sleep(std::time::Duration::from_micros(100));
  }
  ctx.engine().check_invariants(ctx.octree()).unwrap();
  assert_eq!(ctx.visible_nodes(), 9);
  assert_eq!(ctx.listener().visible["r"], 0);
}
