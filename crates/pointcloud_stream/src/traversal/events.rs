//! Notifications emitted by the traversal engine.

use crate::octree::NodeId;

/// Buffered during `traverse` and drained by the context afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalEvent {
  /// An internal node became displayed; its points are wanted.
  NodeAdded(NodeId),
  /// A displayed internal node was torn down.
  NodeRemoved(NodeId),
  /// The culling mask of this node changed.
  CullingMaskChanged(NodeId),
  /// A rendered-cut node was reprojected.
  PriorityChanged(NodeId),
  /// The page holding this node must be loaded.
  PageRequested(NodeId),
}
