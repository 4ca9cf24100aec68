//! JSON frames for the stdio method channel.
//!
//! Each line on stdin is one [`InboundFrame`]; each line on stdout is one
//! [`OutboundFrame`].  Every frame is a JSON object whose `"type"` field
//! names the variant:
//!
//! ```json
//! → {"type":"call","id":1,"method":"discoverPrinters","args":null}
//! → {"type":"usbPermission","action":"com.printlink.USB_PERMISSION","deviceName":"/dev/bus/usb/001/004","granted":true}
//! → {"type":"activity","attached":false}
//! ← {"type":"ready","version":"0.1.0"}
//! ← {"type":"response","id":1,"result":{"status":"success","value":[]}}
//! ← {"type":"protocolError","message":"expected value at line 1 column 1"}
//! ```
//!
//! `call` frames map one-to-one onto [`MethodCall`]; the other inbound
//! variants are host notifications and never produce a response.

use printlink_core::{MethodCall, MethodResponse, MethodResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Application → bridge ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundFrame {
    /// A named operation; answered by exactly one `response` frame.
    Call {
        id: u64,
        method: String,
        #[serde(default)]
        args: Value,
    },

    /// The OS answered a USB permission dialog.
    UsbPermission {
        action: String,
        #[serde(rename = "deviceName")]
        device_name: String,
        granted: bool,
    },

    /// The host activity was attached or detached.
    Activity { attached: bool },
}

impl InboundFrame {
    /// The call carried by this frame, if it is one.
    pub fn into_call(self) -> Option<MethodCall> {
        match self {
            InboundFrame::Call { id, method, args } => Some(MethodCall::new(id, method, args)),
            _ => None,
        }
    }
}

// ── Bridge → application ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundFrame {
    /// Written once at startup, before any response.
    Ready { version: String },

    /// The single result of the call with the same `id`.
    Response { id: u64, result: MethodResult },

    /// An inbound line that could not be decoded and carried no usable `id`.
    ProtocolError { message: String },
}

impl From<MethodResponse> for OutboundFrame {
    fn from(response: MethodResponse) -> Self {
        OutboundFrame::Response {
            id: response.id,
            result: response.result,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use printlink_core::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_call_frame_without_args_defaults_to_null() {
        // Arrange
        let raw = r#"{"type":"call","id":3,"method":"isConnected"}"#;

        // Act
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();

        // Assert
        assert_eq!(
            frame.into_call(),
            Some(MethodCall::new(3, "isConnected", Value::Null))
        );
    }

    #[test]
    fn test_usb_permission_frame_uses_camel_case_device_name() {
        let raw = json!({
            "type": "usbPermission",
            "action": "com.printlink.USB_PERMISSION",
            "deviceName": "/dev/bus/usb/001/004",
            "granted": true
        });

        let frame: InboundFrame = serde_json::from_value(raw).unwrap();

        assert!(matches!(
            frame,
            InboundFrame::UsbPermission { ref device_name, granted: true, .. }
                if device_name == "/dev/bus/usb/001/004"
        ));
        assert_eq!(frame.into_call(), None);
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        let parsed = serde_json::from_str::<InboundFrame>(r#"{"type":"print","id":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_response_frame_shape() {
        let frame = OutboundFrame::from(MethodResponse::new(
            9,
            MethodResult::error(ErrorCode::NotConnected, "no active connection"),
        ));

        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "response",
                "id": 9,
                "result": {
                    "status": "error",
                    "code": "NOT_CONNECTED",
                    "message": "no active connection"
                }
            })
        );
    }

    #[test]
    fn test_protocol_error_tag_is_camel_case() {
        let frame = OutboundFrame::ProtocolError {
            message: "bad".into(),
        };
        assert_eq!(
            serde_json::to_value(frame).unwrap()["type"],
            "protocolError"
        );
    }
}
