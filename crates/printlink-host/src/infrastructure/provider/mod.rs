//! Capability provider adapters.
//!
//! - [`network`]: real TCP byte streams and a port-9100 subnet sweep.
//! - [`desktop`]: the permission source for hosts without runtime prompts.
//! - [`mock`]: scriptable, call-recording doubles for tests.

pub mod desktop;
pub mod mock;
pub mod network;
