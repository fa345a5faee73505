//! Inbound fetch - turns mailbox messages into tickets and replies

pub mod worker;

pub use worker::{FetchSummary, FetchWorker};
