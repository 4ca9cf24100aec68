//! Infrastructure layer for the host.
//!
//! Contains OS-facing adapters: capability providers, the worker pool,
//! configuration storage, and the method-channel facade.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `printlink_core`, but MUST NOT be imported by the `application` layer
//! outside of its tests.

pub mod provider;
pub mod storage;
pub mod ui_bridge;
pub mod worker_pool;
