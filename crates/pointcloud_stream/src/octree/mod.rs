//! Out-of-core octree: bounds, masks, nodes, metadata and paged hierarchy.

mod bounds;
mod catalog;
mod hierarchy;
mod mask;
mod metadata;
mod node;

pub use bounds::{octant_of, NodeBounds};
pub use catalog::Octree;
pub use hierarchy::{encode_page, PageEntry, PageLayout};
pub use mask::{NodeFlags, OctantMask};
pub use metadata::{AttributeKind, AttributeOffsets, ElementType, PointAttribute, PointLayout, TreeMetadata};
pub use node::{NodeId, OctreeNode, PageState, Subtree, SubtreeId};
