//! Frustum-prioritised, budgeted traversal.

mod engine;
mod events;
mod params;
mod priority;

pub use engine::{TraversalEngine, TraversalStage};
pub use events::TraversalEvent;
pub use params::TraversalParams;
pub use priority::PriorityModel;
