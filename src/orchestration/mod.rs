//! Polling scheduler driving participant cycles and retention pruning.

pub mod scheduler;

pub use scheduler::Scheduler;
