//! Domain layer for printlink-bridge.
//!
//! Pure types only: the JSON frames exchanged with the application and the
//! resolved runtime configuration.  Nothing here touches stdin, stdout, or
//! the file system.

pub mod config;
pub mod messages;

pub use config::BridgeConfig;
pub use messages::{InboundFrame, OutboundFrame};
