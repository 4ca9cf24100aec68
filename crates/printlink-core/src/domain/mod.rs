//! Domain entities for PrintLink.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//! Nothing here opens a socket, touches a radio, or spawns a task; the
//! application layer in `printlink-host` drives these types from the outside.
//!
//! Code in outer layers (application, infrastructure, bridge) depends on the
//! domain, but the domain never depends on them.

/// Deduplicating result accumulator used by every discovery scan.
pub mod accumulator;

/// Network identifier parsing and resolved connection endpoints.
pub mod address;

/// Transports, raw provider records, and the normalised device shape.
pub mod device;

/// Printer identity heuristic for Bluetooth device names.
pub mod identity;

/// Discovery scan kinds and their per-kind policy.
pub mod scan;

/// Discovery and connection session state machines.
pub mod session;
