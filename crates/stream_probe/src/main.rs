//! Headless point cloud streaming probe.
//!
//! Opens an octree directory, parks a camera where the config says, ticks
//! the traversal context until the working set settles and prints it.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::ProbeConfig;
use pointcloud_stream::{DataSource, DirectorySource, NodeView, Octree, RenderListener, TraversalContext};

/// Streams a point cloud octree from disk and reports what would be drawn.
#[derive(Parser, Debug)]
#[command(name = "stream_probe")]
#[command(about = "Streams a point cloud octree headlessly and reports the working set")]
struct Args {
  /// Path to configuration TOML file.
  #[arg(short, long)]
  config: PathBuf,

  /// Tree directory (overrides `tree` in the config).
  #[arg(short, long)]
  tree: Option<PathBuf>,

  /// Point budget (overrides `traversal.point_budget`).
  #[arg(short, long)]
  budget: Option<u64>,

  /// Maximum ticks (overrides `run.max_ticks`).
  #[arg(long)]
  ticks: Option<u64>,

  /// Run load jobs on the main thread.
  #[arg(long)]
  inline: bool,

  /// Print every displayed node, not just the summary.
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Debug)]
struct Shown {
  points: usize,
  render_mask: u8,
}

/// Mirrors the renderer's view of the working set.
#[derive(Default)]
struct WorkingSet {
  nodes: BTreeMap<String, Shown>,
  shows: u64,
  hides: u64,
}

impl RenderListener for WorkingSet {
  fn node_visible(&mut self, node: &NodeView<'_>) {
    log::trace!("show {} ({} points)", node.name, node.points.len());
    self.shows += 1;
    self.nodes.insert(
      node.name.to_string(),
      Shown {
        points: node.points.len(),
        render_mask: node.render_mask.bits(),
      },
    );
  }

  fn node_hidden(&mut self, node: &NodeView<'_>) {
    log::trace!("hide {}", node.name);
    self.hides += 1;
    self.nodes.remove(node.name);
  }

  fn render_mask_changed(&mut self, node: &NodeView<'_>) {
    if let Some(shown) = self.nodes.get_mut(node.name) {
      shown.render_mask = node.render_mask.bits();
    }
  }
}

fn main() -> Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let args = Args::parse();

  log::info!("Loading config from: {}", args.config.display());
  let mut config = ProbeConfig::load(&args.config)?;
  if let Some(tree) = &args.tree {
    config.tree = tree.display().to_string();
  }
  if let Some(budget) = args.budget {
    config.traversal.point_budget = budget;
  }
  if let Some(ticks) = args.ticks {
    config.run.max_ticks = ticks;
  }
  config.run.inline |= args.inline;

  let source: Arc<dyn DataSource> = Arc::new(DirectorySource::new(&config.tree));
  let octree = Octree::open(source).with_context(|| format!("Failed to open tree at {}", config.tree))?;
  let meta = Arc::clone(octree.metadata());
  log::info!(
    "Tree {}: {} points, spacing {}, step size {}",
    config.tree,
    meta.points,
    meta.spacing,
    meta.step_size
  );

  let stream = config.stream();
  let mut context = TraversalContext::init(
    octree,
    WorkingSet::default(),
    stream,
    config.camera(),
    config.traversal(),
  );

  let mut last = None;
  for _ in 0..config.run.max_ticks {
    let stats = context.step(None, None);
    log::debug!(
      "tick {}: {:?} visible={} points={} pages={} loads={} {}us",
      stats.tick,
      stats.stage,
      stats.visible_nodes,
      stats.point_count,
      stats.pending_pages,
      stats.pending_loads,
      stats.elapsed_us
    );
    last = Some(stats);
    if stats.settled && stats.pending_pages == 0 && stats.pending_loads == 0 {
      break;
    }
    if !config.run.inline && !stats.traversed {
      std::thread::sleep(Duration::from_millis(1));
    }
  }

  let Some(last) = last else {
    anyhow::bail!("run.max_ticks is 0, nothing to do");
  };
  if !last.settled {
    log::warn!("Stopped after {} ticks without settling", last.tick);
  }

  let set = context.listener();
  let drawn: usize = set.nodes.values().map(|s| s.points).sum();
  println!(
    "Settled={} after {} ticks: {} nodes visible, {} points budgeted, {} points drawn",
    last.settled,
    last.tick,
    set.nodes.len(),
    last.point_count,
    drawn
  );
  println!("Shown {} times, hidden {} times", set.shows, set.hides);
  #[cfg(feature = "metrics")]
  println!(
    "Average tick {:.1}us, worker {:.1}us",
    context.metrics().avg_tick_us(),
    context.metrics().avg_worker_us()
  );

  if args.verbose {
    for (name, shown) in &set.nodes {
      println!("  {:<24} {:>9} points  mask {:08b}", name, shown.points, shown.render_mask);
    }
  }

  context.dispose();
  Ok(())
}
