//! Method-channel envelope and the stable error codes carried in it.

pub mod codes;
pub mod messages;

pub use codes::ErrorCode;
pub use messages::{MethodCall, MethodResponse, MethodResult};
