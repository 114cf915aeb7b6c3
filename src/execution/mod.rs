// Position lookup and order execution module
pub mod executor;
pub mod position_tracker;

pub use executor::{ExecutionAction, ExecutionDecision, Executor};
pub use position_tracker::PositionTracker;
