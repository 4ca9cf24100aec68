//! printlink-bridge library crate.
//!
//! The bridge is the method channel between an application and the PrintLink
//! host.  It reads one JSON frame per line on stdin, hands calls to the
//! plugin facade through the worker pool, and writes every response back on
//! stdout from a single writer task.
//!
//! # Architecture
//!
//! ```text
//! Application  (newline-delimited JSON over stdin/stdout)
//!         ↕
//! [printlink-bridge]
//!   ├── domain/           Frame types, BridgeConfig
//!   ├── application/      Frame decoding and encoding
//!   └── infrastructure/
//!         └── stdio_server/  Reader loop, worker dispatch, delivery writer
//!         ↕
//! printlink-host  (PluginFacade → coordinator / session manager → provider)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `printlink-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `printlink-host`.

/// Domain layer: frame types and configuration.
pub mod domain;

/// Application layer: frame decoding and encoding.
pub mod application;

/// Infrastructure layer: the stdio server.
pub mod infrastructure;
