//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory (or an explicit path), writes it back when
//! asked, and falls back to defaults when no file exists yet.

pub mod config;
