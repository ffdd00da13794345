//! The helm: behaviors, modes and the arbitration loop built on `core`.

pub mod behavior;
pub mod behavior_set;
pub mod behaviors;
pub mod bus;
pub mod condition;
pub mod engine;
pub mod failover;
pub mod helm;
pub mod mode;
pub mod report;
