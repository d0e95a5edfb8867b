//! The octree catalog: metadata, node arena and page bookkeeping.

use std::collections::VecDeque;
use std::sync::Arc;

use super::hierarchy::PageLayout;
use super::metadata::TreeMetadata;
use super::node::{NodeId, OctreeNode, PageState, Subtree, SubtreeId};
use crate::constants::{GHOST_POINT_COUNT, METADATA_FILE, PAGE_EXTENSION, POINT_EXTENSION, ROOT_PREFIX, ROOT_SUB_DIR};
use crate::error::{PageError, Result, StreamError};
use crate::source::DataSource;

impl Subtree {
  /// Reads and decodes this page from `source`, resolving unknown counts.
  ///
  /// Touches no node state, so it can run on a worker.
  pub fn read(&self, meta: &TreeMetadata, source: &dyn DataSource) -> std::result::Result<PageLayout, PageError> {
    let path = page_path(meta, self);
    let bytes = source.read(&path).map_err(|source| PageError::Io {
      path: path.clone(),
      source,
    })?;
    let mut layout = PageLayout::decode(&bytes, meta.step_size, &path)?;
    layout.resolve_unknown_counts(meta.stride(), |local_name| {
      let bin = point_path(meta, self, local_name);
      source.file_len(&bin).map_err(|source| PageError::Io { path: bin, source })
    })?;
    Ok(layout)
  }
}

fn page_path(meta: &TreeMetadata, subtree: &Subtree) -> String {
  format!("{}/{}{}.{}", meta.octree_dir, subtree.sub_dir, subtree.prefix, PAGE_EXTENSION)
}

fn point_path(meta: &TreeMetadata, subtree: &Subtree, local_name: &str) -> String {
  format!(
    "{}/{}{}{}.{}",
    meta.octree_dir, subtree.sub_dir, subtree.prefix, local_name, POINT_EXTENSION
  )
}

/// An opened tree. Nodes are created as pages load and never removed.
pub struct Octree {
  meta: Arc<TreeMetadata>,
  source: Arc<dyn DataSource>,
  nodes: Vec<OctreeNode>,
  subtrees: Vec<Subtree>,
  root: NodeId,
}

impl std::fmt::Debug for Octree {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Octree")
      .field("source", &self.source.describe())
      .field("nodes", &self.nodes.len())
      .field("subtrees", &self.subtrees.len())
      .finish()
  }
}

impl Octree {
  /// Reads the metadata and creates the root node. The root page stays unloaded.
  pub fn open(source: Arc<dyn DataSource>) -> Result<Self> {
    let bytes = source.read(METADATA_FILE).map_err(|e| StreamError::Io {
      path: format!("{}/{}", source.describe(), METADATA_FILE),
      source: e,
    })?;
    let meta = TreeMetadata::from_json(&bytes)?;
    log::debug!(
      "opened tree {} (version {}, stride {}, step {})",
      source.describe(),
      meta.version,
      meta.stride(),
      meta.step_size
    );
    Ok(Self::from_metadata(meta, source))
  }

  /// Opens the tree and loads the root page synchronously.
  pub fn load_root(source: Arc<dyn DataSource>) -> Result<Self> {
    let mut octree = Self::open(source)?;
    let root_page = octree.node(octree.root).subtree;
    octree.load_page(root_page)?;
    Ok(octree)
  }

  pub fn from_metadata(meta: TreeMetadata, source: Arc<dyn DataSource>) -> Self {
    let root_id = NodeId(0);
    let root_page = SubtreeId(0);
    let root = OctreeNode::new(
      String::new(),
      ROOT_PREFIX,
      meta.bounds,
      meta.spacing,
      0,
      0,
      None,
      root_page,
    );
    Self {
      meta: Arc::new(meta),
      source,
      nodes: vec![root],
      subtrees: vec![Subtree {
        root: root_id,
        sub_dir: ROOT_SUB_DIR.to_string(),
        prefix: ROOT_PREFIX.to_string(),
        state: PageState::Unloaded,
      }],
      root: root_id,
    }
  }

  /// Reads and installs a page on the calling thread.
  pub fn load_page(&mut self, id: SubtreeId) -> std::result::Result<(), PageError> {
    match self.subtree(id).read(&self.meta, self.source.as_ref()) {
      Ok(layout) => {
        self.install_page(id, layout);
        Ok(())
      }
      Err(err) => {
        self.fail_page(id);
        Err(err)
      }
    }
  }

  /// Builds the nodes described by `layout` below the page root.
  ///
  /// Installing into a page that is already loaded is a caller defect.
  pub fn install_page(&mut self, id: SubtreeId, layout: PageLayout) {
    debug_assert_eq!(self.subtree(id).state, PageState::Unloaded, "page {:?} loaded twice", id);
    if self.subtree(id).state == PageState::Loaded {
      return;
    }

    let step_size = self.meta.step_size as usize;
    let page_root = self.subtree(id).root;
    let mut pending = VecDeque::from([page_root]);

    for entry in layout.entries {
      let Some(node_id) = pending.pop_front() else {
        log::debug!("page {}: layout longer than its tree", self.subtree(id).prefix);
        break;
      };
      debug_assert_eq!(self.node(node_id).local_name, entry.local_name);

      let node = &mut self.nodes[node_id.index()];
      node.descendant_mask = entry.mask;
      node.point_count = entry.point_count;

      let parent = node.clone_shape();
      let mut children = [NodeId(0); 8];
      for (octant, slot) in children.iter_mut().enumerate() {
        let octant = octant as u8;
        let bounds = parent.bounds.child(octant);
        let child_local = format!("{}{}", parent.local_name, octant);
        let child_id = NodeId(self.nodes.len() as u32);

        let child = if !parent.mask.contains(octant) {
          let mut ghost = OctreeNode::new(
            child_local,
            &parent.prefix,
            bounds,
            parent.spacing * 0.5,
            parent.depth + 1,
            octant,
            Some(node_id),
            id,
          );
          ghost.point_count = GHOST_POINT_COUNT;
          ghost
        } else if parent.local_name.len() + 1 == step_size {
          let page = self.subtrees[id.index()].clone();
          let new_page = SubtreeId(self.subtrees.len() as u32);
          self.subtrees.push(Subtree {
            root: child_id,
            sub_dir: format!("{}{}/", page.sub_dir, child_local),
            prefix: format!("{}{}", page.prefix, child_local),
            state: PageState::Unloaded,
          });
          OctreeNode::new(
            String::new(),
            &format!("{}{}", page.prefix, child_local),
            bounds,
            parent.spacing * 0.5,
            parent.depth + 1,
            octant,
            Some(node_id),
            new_page,
          )
        } else {
          pending.push_back(child_id);
          OctreeNode::new(
            child_local,
            &parent.prefix,
            bounds,
            parent.spacing * 0.5,
            parent.depth + 1,
            octant,
            Some(node_id),
            id,
          )
        };
        self.nodes.push(child);
        *slot = child_id;
      }
      self.nodes[node_id.index()].children = Some(children);
    }

    if !pending.is_empty() {
      log::warn!(
        "page {}: {} nodes without records",
        self.subtree(id).prefix,
        pending.len()
      );
    }
    self.subtrees[id.index()].state = PageState::Loaded;
    log::debug!(
      "installed page {} ({} nodes total)",
      self.subtree(id).prefix,
      self.nodes.len()
    );
  }

  /// Marks a page as permanently failed.
  pub fn fail_page(&mut self, id: SubtreeId) {
    self.subtrees[id.index()].state = PageState::Failed;
  }

  #[inline]
  pub fn root(&self) -> NodeId {
    self.root
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> &OctreeNode {
    &self.nodes[id.index()]
  }

  #[inline]
  pub fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
    &mut self.nodes[id.index()]
  }

  #[inline]
  pub fn subtree(&self, id: SubtreeId) -> &Subtree {
    &self.subtrees[id.index()]
  }

  /// Page state of the page that holds `node`.
  #[inline]
  pub fn page_state(&self, node: NodeId) -> PageState {
    self.subtree(self.node(node).subtree).state
  }

  pub fn metadata(&self) -> &Arc<TreeMetadata> {
    &self.meta
  }

  pub fn source(&self) -> &Arc<dyn DataSource> {
    &self.source
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn subtree_count(&self) -> usize {
    self.subtrees.len()
  }

  pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
    (0..self.nodes.len() as u32).map(NodeId)
  }

  /// Looks a node up by its tree-unique name. Linear; for tools and tests.
  pub fn find(&self, name: &str) -> Option<NodeId> {
    self.nodes.iter().position(|n| n.name == name).map(|i| NodeId(i as u32))
  }

  pub fn page_file_path(&self, id: SubtreeId) -> String {
    page_path(&self.meta, self.subtree(id))
  }

  pub fn point_file_path(&self, node: NodeId) -> String {
    let n = self.node(node);
    point_path(&self.meta, self.subtree(n.subtree), &n.local_name)
  }
}

/// Parent fields needed while building children.
struct NodeShape {
  bounds: super::NodeBounds,
  spacing: f64,
  depth: u32,
  local_name: String,
  prefix: String,
  mask: super::OctantMask,
}

impl OctreeNode {
  fn clone_shape(&self) -> NodeShape {
    let prefix_len = self.name.len() - self.local_name.len();
    NodeShape {
      bounds: self.bounds,
      spacing: self.spacing,
      depth: self.depth,
      local_name: self.local_name.clone(),
      prefix: self.name[..prefix_len].to_string(),
      mask: self.descendant_mask,
    }
  }
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;
