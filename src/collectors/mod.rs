//! Garbage collection layered on the arena's block metadata.

pub mod collector;
pub mod mark_sweep;

pub use collector::Collector;
pub use mark_sweep::{ChainScanCollector, WorklistCollector};
