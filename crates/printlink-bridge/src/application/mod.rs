//! Application layer for printlink-bridge.
//!
//! Translates between text lines and frames.  Reading stdin, spawning
//! operations, and writing stdout belong to the infrastructure layer.

pub mod bridge_service;

pub use bridge_service::{decode_frame, encode_frame, reject_frame, BridgeError};
