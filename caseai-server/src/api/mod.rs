//! HTTP API for caseai-server

pub mod handlers;
pub mod messages;
pub mod server;
pub mod speech;
pub mod sse;

pub use server::{build_router, run};
