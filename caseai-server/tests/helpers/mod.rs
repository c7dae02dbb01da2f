//! Test helpers for caseai-server integration tests
//!
//! - TestServer: router + context over a temp-file SQLite database
//! - FakeSpeech: in-memory synthesizer/transcriber

#![allow(dead_code)]

pub mod test_server;

pub use test_server::{FakeSpeech, TestServer};
