//! Anfrage Storage - Database access for tickets, conversations and the
//! outbound queue
//!
//! Every repository is a trait with a PostgreSQL implementation; the
//! `memory` module provides in-process implementations with the same
//! semantics for tests and local tooling.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
