//! Stream join and rule evaluation

pub mod evaluator;
pub mod joiner;

pub use evaluator::evaluate;
pub use joiner::{CombinedSnapshot, Observation, StreamJoiner};
