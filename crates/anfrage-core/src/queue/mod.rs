//! Outbound queue processing

pub mod drain;

pub use drain::{DrainSummary, DrainWorker};
