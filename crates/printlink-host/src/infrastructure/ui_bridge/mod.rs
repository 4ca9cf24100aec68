//! Method-channel facade: exposes application-layer operations to the app.
//!
//! Every named operation arrives as `(method, args)` with JSON arguments and
//! resolves exactly once with a [`MethodResult`].  This module owns argument
//! extraction, the host-activity precondition, dispatch to the coordinator
//! and session manager, and rendering of results into the JSON shapes the
//! app expects.  The Application layer never imports it.
//!
//! # Data Transfer Objects (DTOs)
//!
//! [`PrinterDto`] is the JSON printer record.  Field names are camelCase
//! (`friendlyName`, `interfaceType`, `additionalInfo`) and mirror the Dart
//! model on the app side; renaming one is a breaking change there.
//!
//! # Host activity
//!
//! Bluetooth, USB, and permission operations need a foreground activity on
//! the host (the OS shows dialogs on it).  When none is attached they answer
//! `NO_ACTIVITY` without touching anything.  Detaching also cancels every
//! pending USB permission wait.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use printlink_core::{
    BluetoothSecurity, DiscoveredDevice, ErrorCode, InterfaceType, MethodResult, ScanKind,
    Transport, DEFAULT_MULTICAST_HOPS,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::application::connect::{ConnectRequest, ConnectionManager};
use crate::application::discover::{DiscoveryCoordinator, DiscoveryOutcome};
use crate::application::permissions::{PermissionGate, PermissionSource};
use crate::application::provider::DeviceProvider;
use crate::application::usb_permission::{request_usb_access, UsbPermissionBroker};
use crate::infrastructure::storage::config::AppConfig;

/// Methods answered inline by the reader instead of going through the pool.
const INLINE_METHODS: [&str; 2] = ["isConnected", "getActiveConnection"];

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One printer as rendered to the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDto {
    pub friendly_name: Option<String>,
    pub address: String,
    pub port: u16,
    /// `tcp`, `bluetooth`, or `usb`; feeds straight back into `connect`.
    pub interface_type: String,
    pub transport: Transport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_info: BTreeMap<String, Value>,
}

impl From<&DiscoveredDevice> for PrinterDto {
    fn from(d: &DiscoveredDevice) -> Self {
        Self {
            friendly_name: d.friendly_name.clone(),
            address: d.address.clone(),
            port: d.port,
            interface_type: InterfaceType::for_transport(d.transport).as_str().to_string(),
            transport: d.transport,
            serial_number: d.serial_number.clone(),
            additional_info: d.extra.clone(),
        }
    }
}

// ── Argument extraction ───────────────────────────────────────────────────────

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, MethodResult> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(MethodResult::error(
            ErrorCode::InvalidArgument,
            format!("{key} must be a string, got {other}"),
        )),
    }
}

/// A present, non-blank string argument.
fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, MethodResult> {
    arg_str(args, key)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| MethodResult::error(ErrorCode::MissingArgument, format!("{key} is required")))
}

fn arg_u64(args: &Value, key: &str) -> Result<Option<u64>, MethodResult> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| {
            MethodResult::error(
                ErrorCode::InvalidArgument,
                format!("{key} must be a non-negative integer, got {v}"),
            )
        }),
    }
}

macro_rules! try_arg {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(result) => return result,
        }
    };
}

// ── Facade ────────────────────────────────────────────────────────────────────

pub struct PluginFacade {
    provider: Arc<dyn DeviceProvider>,
    gate: PermissionGate,
    coordinator: Arc<DiscoveryCoordinator>,
    connections: Arc<ConnectionManager>,
    broker: Arc<UsbPermissionBroker>,
    activity_attached: AtomicBool,
}

impl PluginFacade {
    /// Wires the application components from configuration.  The facade
    /// starts with an activity attached.
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        permissions: Arc<dyn PermissionSource>,
        config: &AppConfig,
    ) -> Self {
        let gate = PermissionGate::new(permissions);
        let coordinator = Arc::new(DiscoveryCoordinator::new(
            Arc::clone(&provider),
            gate.clone(),
            config.identity.to_identity(),
            config.discovery.to_settings(),
        ));
        let broker = Arc::new(UsbPermissionBroker::new());
        let connections = Arc::new(ConnectionManager::new(
            Arc::clone(&provider),
            gate.clone(),
            Arc::clone(&coordinator),
            Arc::clone(&broker),
            config.connection.to_settings(),
        ));
        Self {
            provider,
            gate,
            coordinator,
            connections,
            broker,
            activity_attached: AtomicBool::new(true),
        }
    }

    // ── Host lifecycle ───────────────────────────────────────────────────────

    pub fn attach_activity(&self) {
        info!("host activity attached");
        self.activity_attached.store(true, Ordering::SeqCst);
    }

    pub fn detach_activity(&self) {
        info!("host activity detached");
        self.activity_attached.store(false, Ordering::SeqCst);
        self.broker.cancel_all();
    }

    pub fn has_activity(&self) -> bool {
        self.activity_attached.load(Ordering::SeqCst)
    }

    /// Forwards an OS USB permission broadcast.
    pub fn on_usb_permission(&self, action: &str, device_name: &str, granted: bool) -> bool {
        self.broker.notify(action, device_name, granted)
    }

    /// Closes the active connection and abandons pending permission waits.
    pub async fn shutdown(&self) {
        self.broker.cancel_all();
        self.connections.shutdown().await;
    }

    /// Queries that read the session snapshot without awaiting any I/O, so
    /// the reader may answer them without going through the worker pool.
    pub fn is_inline(method: &str) -> bool {
        INLINE_METHODS.contains(&method)
    }

    fn require_activity(&self, what: &str) -> Result<(), MethodResult> {
        if self.has_activity() {
            Ok(())
        } else {
            Err(MethodResult::error(
                ErrorCode::NoActivity,
                format!("Activity context is required for {what}"),
            ))
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    pub async fn handle(&self, method: &str, args: &Value) -> MethodResult {
        debug!(method, "handling call");
        match method {
            "discoverPrinters" => self.discover(ScanKind::LocalBroadcast).await,
            "discoverNetworkPrintersAuto" => self.discover(ScanKind::NetworkAuto).await,
            "discoverMulticastPrinters" => {
                let hops = try_arg!(arg_u64(args, "hops"))
                    .map(|h| u32::try_from(h).unwrap_or(u32::MAX))
                    .unwrap_or(DEFAULT_MULTICAST_HOPS);
                self.discover(ScanKind::Multicast { hops }).await
            }
            "discoverSubnetSearch" => {
                let range = try_arg!(required_str(args, "subnetRange"));
                self.discover(ScanKind::Subnet {
                    range: range.trim().to_string(),
                })
                .await
            }
            "discoverBluetoothPrinters" => {
                try_arg!(self.require_activity("Bluetooth discovery"));
                self.discover(ScanKind::Bluetooth).await
            }
            "discoverBluetoothNative" => {
                try_arg!(self.require_activity("native Bluetooth scanning"));
                match self.coordinator.discover_ble_radio().await {
                    Ok(records) => MethodResult::success(records),
                    Err(e) => MethodResult::error(e.code(), e.to_string()),
                }
            }
            "discoverUsbPrinters" => {
                try_arg!(self.require_activity("USB discovery"));
                self.discover(ScanKind::Usb).await
            }
            "testDirectBleConnection" => {
                try_arg!(self.require_activity("BLE connection"));
                let mac = try_arg!(arg_str(args, "macAddress")).unwrap_or_default();
                self.test_direct_ble(mac).await
            }
            "requestBluetoothPermissions" => {
                try_arg!(self.require_activity("permission requests"));
                match self.gate.require_bluetooth() {
                    Ok(()) => MethodResult::success(true),
                    Err(missing) => {
                        MethodResult::error(ErrorCode::PermissionDenied, missing.to_string())
                    }
                }
            }
            "requestUsbPermissions" => {
                try_arg!(self.require_activity("USB permission requests"));
                let device = try_arg!(required_str(args, "deviceName"));
                match request_usb_access(self.provider.as_ref(), &self.gate, device).await {
                    Ok(granted) => MethodResult::success(granted),
                    Err(e) => MethodResult::error(e.code(), e.to_string()),
                }
            }
            "connect" => self.connect(args).await,
            "disconnect" => match self.connections.disconnect().await {
                Ok(()) => MethodResult::success(true),
                Err(e) => MethodResult::error(e.code(), e.to_string()),
            },
            "sendCommands" => {
                let Some(commands) = try_arg!(arg_str(args, "commands")) else {
                    return MethodResult::error(ErrorCode::MissingArgument, "commands is required");
                };
                match self.connections.send(commands.as_bytes()).await {
                    Ok(()) => MethodResult::success(true),
                    Err(e) => MethodResult::error(e.code(), e.to_string()),
                }
            }
            "isConnected" => MethodResult::success(self.connections.is_connected()),
            "getActiveConnection" => match self.connections.active_connection() {
                Some(active) => MethodResult::success(json!({
                    "isConnected": true,
                    "type": active.interface.as_str(),
                })),
                None => MethodResult::success(Value::Null),
            },
            other => {
                warn!(method = other, "unknown method");
                MethodResult::error(
                    ErrorCode::NotImplemented,
                    format!("method {other} is not implemented"),
                )
            }
        }
    }

    async fn discover(&self, kind: ScanKind) -> MethodResult {
        match self.coordinator.discover(kind).await {
            Ok(DiscoveryOutcome { session, devices }) => {
                debug!(session = %session.id, state = %session.state(), "rendering results");
                let dtos: Vec<PrinterDto> = devices.iter().map(PrinterDto::from).collect();
                MethodResult::success(dtos)
            }
            Err(e) => MethodResult::error(e.code(), e.to_string()),
        }
    }

    async fn connect(&self, args: &Value) -> MethodResult {
        let interface = try_arg!(required_str(args, "interfaceType"));
        let interface = match interface.parse::<InterfaceType>() {
            Ok(i) => i,
            Err(e) => return MethodResult::error(ErrorCode::UnsupportedInterface, e.to_string()),
        };
        let identifier = try_arg!(required_str(args, "identifier"));
        let timeout = try_arg!(arg_u64(args, "timeout")).map(Duration::from_millis);
        let security = BluetoothSecurity::from_option(try_arg!(arg_str(args, "connectionType")));

        let request = ConnectRequest {
            interface,
            identifier: identifier.to_string(),
            timeout,
            security,
        };
        match self.connections.connect(request).await {
            Ok(_) => MethodResult::success(true),
            Err(e) => MethodResult::error(e.code(), e.to_string()),
        }
    }

    async fn test_direct_ble(&self, mac: &str) -> MethodResult {
        match self.connections.test_direct_ble(mac).await {
            Ok(probe) => {
                let friendly_name = if probe.status_available {
                    "Direct BLE"
                } else {
                    "Direct BLE (status unavailable)"
                };
                MethodResult::success(json!([{
                    "friendlyName": friendly_name,
                    "address": probe.address,
                    "port": 0,
                    "interfaceType": InterfaceType::Bluetooth.as_str(),
                    "transport": Transport::BluetoothLe,
                    "status": probe.status,
                    "serialNumber": "Unknown",
                }]))
            }
            Err(e) => MethodResult::error(e.code(), e.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::permissions::Permission;
    use crate::application::usb_permission::USB_PERMISSION_ACTION;
    use crate::infrastructure::provider::mock::{MockPermissions, MockProvider, ScanScript};
    use printlink_core::{RawDevice, UsbDeviceInfo};

    fn facade_with(provider: Arc<MockProvider>, perms: Arc<MockPermissions>) -> PluginFacade {
        PluginFacade::new(provider, perms, &AppConfig::default())
    }

    fn facade() -> (Arc<MockProvider>, Arc<MockPermissions>, PluginFacade) {
        let provider = Arc::new(MockProvider::new());
        let perms = Arc::new(MockPermissions::all_granted(33));
        let facade = facade_with(Arc::clone(&provider), Arc::clone(&perms));
        (provider, perms, facade)
    }

    // ── Discovery rendering ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_discovered_printers_render_as_camel_case_dtos() {
        // Arrange
        let (provider, _, facade) = facade();
        provider.script(
            &ScanKind::LocalBroadcast,
            ScanScript::new()
                .found(
                    RawDevice::new(Transport::Network, "10.0.0.5")
                        .with_data("FRIENDLY_NAME", "ZT410")
                        .with_data("SERIAL_NUMBER", "XXZT1234")
                        .with_data("FIRMWARE", "V75.20"),
                )
                .finish(),
        );

        // Act
        let result = facade.handle("discoverPrinters", &Value::Null).await;

        // Assert
        let value = result.value().unwrap();
        assert_eq!(value[0]["friendlyName"], "ZT410");
        assert_eq!(value[0]["interfaceType"], "tcp");
        assert_eq!(value[0]["transport"], "network");
        assert_eq!(value[0]["port"], 9100);
        assert_eq!(value[0]["serialNumber"], "XXZT1234");
        assert_eq!(value[0]["additionalInfo"]["FIRMWARE"], "V75.20");
    }

    #[tokio::test]
    async fn test_multicast_hops_default_to_three() {
        let (provider, _, facade) = facade();

        facade.handle("discoverMulticastPrinters", &json!({})).await;
        facade.handle("discoverMulticastPrinters", &json!({"hops": 5})).await;

        assert_eq!(
            provider.scan_calls(),
            vec![ScanKind::Multicast { hops: 3 }, ScanKind::Multicast { hops: 5 }]
        );
    }

    #[tokio::test]
    async fn test_subnet_search_requires_range() {
        let (provider, _, facade) = facade();

        let result = facade.handle("discoverSubnetSearch", &json!({})).await;

        assert_eq!(result.code(), Some(ErrorCode::MissingArgument));
        assert!(provider.scan_calls().is_empty());
    }

    // ── Activity precondition ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_detached_host_answers_no_activity() {
        let (provider, _, facade) = facade();
        facade.detach_activity();

        for method in [
            "discoverBluetoothPrinters",
            "discoverBluetoothNative",
            "discoverUsbPrinters",
            "testDirectBleConnection",
            "requestBluetoothPermissions",
            "requestUsbPermissions",
        ] {
            let result = facade.handle(method, &json!({})).await;
            assert_eq!(result.code(), Some(ErrorCode::NoActivity), "{method}");
        }
        assert!(provider.scan_calls().is_empty());

        facade.attach_activity();
        assert!(facade.handle("discoverUsbPrinters", &json!({})).await.is_success());
    }

    #[tokio::test]
    async fn test_detach_cancels_pending_usb_permission() {
        let (_, _, facade) = facade();
        let pending = facade.broker.request("/dev/bus/usb/001/004");

        facade.detach_activity();

        assert!(!pending.await.unwrap());
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_bluetooth_permission_query() {
        let (_, perms, facade) = facade();
        assert_eq!(
            facade.handle("requestBluetoothPermissions", &Value::Null).await.value(),
            Some(&json!(true))
        );

        perms.revoke(Permission::FineLocation);
        perms.revoke(Permission::CoarseLocation);
        let result = facade.handle("requestBluetoothPermissions", &Value::Null).await;
        assert_eq!(result.code(), Some(ErrorCode::PermissionDenied));
    }

    #[tokio::test]
    async fn test_usb_permission_request_flow() {
        let (provider, perms, facade) = facade();
        provider.set_usb_devices(Some(vec![UsbDeviceInfo {
            device_name: "/dev/bus/usb/001/004".into(),
            vendor_id: 2655,
            product_id: 358,
        }]));
        let args = json!({"deviceName": "/dev/bus/usb/001/004"});

        let pending = facade.handle("requestUsbPermissions", &args).await;
        perms.grant_usb("/dev/bus/usb/001/004");
        let granted = facade.handle("requestUsbPermissions", &args).await;

        assert_eq!(pending.value(), Some(&json!(false)));
        assert_eq!(granted.value(), Some(&json!(true)));
        assert_eq!(
            facade.handle("requestUsbPermissions", &json!({})).await.code(),
            Some(ErrorCode::MissingArgument)
        );
    }

    #[tokio::test]
    async fn test_on_usb_permission_forwards_to_broker() {
        let (_, _, facade) = facade();
        let pending = facade.broker.request("/dev/bus/usb/001/004");

        assert!(facade.on_usb_permission(USB_PERMISSION_ACTION, "/dev/bus/usb/001/004", true));
        assert!(pending.await.unwrap());
    }

    // ── Connect arguments ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_connect_argument_errors() {
        let (provider, _, facade) = facade();

        let missing_type = facade.handle("connect", &json!({"identifier": "10.0.0.5"})).await;
        let bad_type = facade
            .handle("connect", &json!({"interfaceType": "serial", "identifier": "COM1"}))
            .await;
        let missing_id = facade.handle("connect", &json!({"interfaceType": "tcp"})).await;
        let bad_timeout = facade
            .handle(
                "connect",
                &json!({"interfaceType": "tcp", "identifier": "10.0.0.5", "timeout": "soon"}),
            )
            .await;

        assert_eq!(missing_type.code(), Some(ErrorCode::MissingArgument));
        assert_eq!(bad_type.code(), Some(ErrorCode::UnsupportedInterface));
        assert_eq!(missing_id.code(), Some(ErrorCode::MissingArgument));
        assert_eq!(bad_timeout.code(), Some(ErrorCode::InvalidArgument));
        assert!(provider.opened_endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_connect_passes_timeout_in_milliseconds() {
        let (provider, _, facade) = facade();

        let result = facade
            .handle(
                "connect",
                &json!({"interfaceType": "TCP", "identifier": "10.0.0.5", "timeout": 1500}),
            )
            .await;

        assert_eq!(result.value(), Some(&json!(true)));
        assert_eq!(provider.open_options(0).timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_active_connection_reports_real_interface() {
        let (_, _, facade) = facade();
        assert_eq!(
            facade.handle("getActiveConnection", &Value::Null).await.value(),
            Some(&Value::Null)
        );

        facade
            .handle("connect", &json!({"interfaceType": "bluetooth", "identifier": "AC:3F:A4:01:02:03"}))
            .await;

        assert_eq!(
            facade.handle("getActiveConnection", &Value::Null).await.value(),
            Some(&json!({"isConnected": true, "type": "bluetooth"}))
        );
    }

    #[tokio::test]
    async fn test_direct_ble_renders_single_element_list() {
        let (_, _, facade) = facade();

        let result = facade
            .handle("testDirectBleConnection", &json!({"macAddress": "AC:3F:A4:00:11:22"}))
            .await;

        let value = result.value().unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["status"], "ready");
        assert_eq!(value[0]["interfaceType"], "bluetooth");
    }

    #[tokio::test]
    async fn test_unknown_method_is_not_implemented() {
        let (_, _, facade) = facade();
        let result = facade.handle("printPdf", &Value::Null).await;
        assert_eq!(result.code(), Some(ErrorCode::NotImplemented));
    }

    #[test]
    fn test_inline_methods() {
        assert!(PluginFacade::is_inline("isConnected"));
        assert!(PluginFacade::is_inline("getActiveConnection"));
        assert!(!PluginFacade::is_inline("connect"));
    }
}
