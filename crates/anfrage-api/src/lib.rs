//! Anfrage API - REST API server
//!
//! This crate provides the HTTP surface of Anfrage Desk: the public inquiry
//! form, staff endpoints for tickets, the outbound queue and mail settings,
//! and the scheduled trigger endpoints that drive the workers.

#![recursion_limit = "256"]

pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::create_openapi_routes;
pub use routes::create_router;
pub use state::{AppState, Repositories};
