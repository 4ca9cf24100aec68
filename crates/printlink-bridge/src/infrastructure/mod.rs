//! Infrastructure layer for printlink-bridge.
//!
//! Owns the process's stdin and stdout: the reader loop that dispatches
//! frames to the plugin facade and the single writer that delivers every
//! response.

pub mod stdio_server;

pub use stdio_server::{run_server, serve};
