//! Message Store
//!
//! Query functions take the pool by reference and acquire a connection per
//! operation; nothing here holds a connection across calls.

pub mod cases;
pub mod messages;
pub mod sessions;

pub use messages::NewMessage;
