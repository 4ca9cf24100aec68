//! printlink-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`,
//! the diagnostic binary in `main.rs`, and the `printlink-bridge` crate share
//! the same module tree.

pub mod application;
pub mod infrastructure;
