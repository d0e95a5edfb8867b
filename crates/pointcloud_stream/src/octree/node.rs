//! Octree nodes and pages, stored in arenas and addressed by id.

use super::bounds::NodeBounds;
use super::mask::{NodeFlags, OctantMask};
use crate::constants::GHOST_POINT_COUNT;
use crate::priority_queue::QueueHandle;
use crate::types::{DisplayStats, PartitionedPoints};

/// Index of a node in the octree arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Index of a page in the octree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubtreeId(pub(crate) u32);

impl SubtreeId {
  #[inline]
  pub fn index(self) -> usize {
    self.0 as usize
  }
}

/// Paging state of a [`Subtree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
  Unloaded,
  Loaded,
  /// Reading or decoding failed. Never retried.
  Failed,
}

/// One hierarchy page: a depth span of the tree loaded as a unit.
#[derive(Clone, Debug)]
pub struct Subtree {
  pub root: NodeId,
  /// Directory fragment under the octree directory, ending in `/`.
  pub sub_dir: String,
  /// Name prefix shared by every node of the page.
  pub prefix: String,
  pub state: PageState,
}

impl Subtree {
  #[inline]
  pub fn is_loaded(&self) -> bool {
    self.state == PageState::Loaded
  }
}

/// A node of the out-of-core octree.
///
/// Structure (bounds, names, children) is written by page installs. The
/// traversal block is owned by the traversal engine; the display block by
/// the load pipeline and context. Everything is mutated on the coordinator.
#[derive(Clone, Debug)]
pub struct OctreeNode {
  /// Page-local octant digits.
  pub local_name: String,
  /// Tree-unique name: page prefix + local name.
  pub name: String,
  pub bounds: NodeBounds,
  pub spacing: f64,
  pub depth: u32,
  /// Octant inside the parent (0 for the root).
  pub octant: u8,
  pub parent: Option<NodeId>,
  /// Present once the node's page is loaded and it is not a page leaf.
  pub children: Option<[NodeId; 8]>,
  pub subtree: SubtreeId,
  /// Authoritative once the page is loaded; [`GHOST_POINT_COUNT`] for ghosts.
  pub point_count: i64,
  /// Children that hold data.
  pub descendant_mask: OctantMask,

  // traversal
  pub flags: NodeFlags,
  pub priority: f64,
  /// Camera epoch of the last projection.
  pub projected_epoch: u64,
  pub queue_handle: Option<QueueHandle>,
  /// Children currently in the traversal queue.
  pub traversal_mask: OctantMask,
  /// Children with priority above zero.
  pub culling_mask: OctantMask,

  // display
  /// Children with data that are not yet displayed.
  pub inheritance_mask: OctantMask,
  /// Render mask last handed to the renderer.
  pub notified_mask: OctantMask,
  pub points: Option<PartitionedPoints>,
  pub stats: Option<DisplayStats>,
  pub visible: bool,
}

impl OctreeNode {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    local_name: String,
    prefix: &str,
    bounds: NodeBounds,
    spacing: f64,
    depth: u32,
    octant: u8,
    parent: Option<NodeId>,
    subtree: SubtreeId,
  ) -> Self {
    Self {
      name: format!("{prefix}{local_name}"),
      local_name,
      bounds,
      spacing,
      depth,
      octant,
      parent,
      children: None,
      subtree,
      point_count: 0,
      descendant_mask: OctantMask::EMPTY,
      flags: NodeFlags::default(),
      priority: 0.0,
      projected_epoch: 0,
      queue_handle: None,
      traversal_mask: OctantMask::EMPTY,
      culling_mask: OctantMask::EMPTY,
      inheritance_mask: OctantMask::EMPTY,
      notified_mask: OctantMask::EMPTY,
      points: None,
      stats: None,
      visible: false,
    }
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.children.is_none()
  }

  #[inline]
  pub fn is_ghost(&self) -> bool {
    self.point_count == GHOST_POINT_COUNT
  }

  #[inline]
  pub fn has_flag(&self, flag: NodeFlags) -> bool {
    self.flags.contains(flag)
  }

  /// Render mask handed to the renderer.
  #[inline]
  pub fn render_mask(&self) -> OctantMask {
    self.inheritance_mask & self.culling_mask
  }

  /// Point count used for budget accounting (ghosts count as nothing).
  #[inline]
  pub fn budget_points(&self) -> u64 {
    self.point_count.max(0) as u64
  }
}
