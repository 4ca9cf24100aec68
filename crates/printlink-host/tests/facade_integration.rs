//! Integration tests for the method-channel facade.
//!
//! These tests drive [`PluginFacade`] through its public `handle` entry point
//! exactly as the bridge does, using the scriptable mock provider for every
//! transport and a real loopback TCP listener for the network provider.
//!
//! They verify:
//!
//! - Network connects default to port 9100 and report the real interface.
//! - Missing or blank arguments fail before any provider work starts.
//! - Sending without a connection fails with `NOT_CONNECTED`.
//! - Bluetooth discovery without permissions never touches the radio.
//! - Connecting again replaces the previous session.
//! - Disconnect is idempotent.
//! - Connection queries answer while a write is stuck in provider I/O.
//! - Discovery resolves even when the provider never starts the scan.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use printlink_core::{Endpoint, ErrorCode, ScanKind};
use printlink_host::application::permissions::Permission;
use printlink_host::infrastructure::provider::mock::{
    MockPermissions, MockProvider, ScanScript, StreamBehavior,
};
use printlink_host::infrastructure::provider::network::NetworkProvider;
use printlink_host::infrastructure::storage::config::AppConfig;
use printlink_host::infrastructure::ui_bridge::PluginFacade;

fn mock_facade() -> (Arc<MockProvider>, Arc<MockPermissions>, PluginFacade) {
    let provider = Arc::new(MockProvider::new());
    let perms = Arc::new(MockPermissions::all_granted(33));
    let facade = PluginFacade::new(
        Arc::<MockProvider>::clone(&provider),
        Arc::<MockPermissions>::clone(&perms),
        &AppConfig::default(),
    );
    (provider, perms, facade)
}

// ── Connect ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tcp_connect_defaults_port_9100() {
    // Arrange
    let (provider, _, facade) = mock_facade();

    // Act
    let result = facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "192.168.1.40"}))
        .await;

    // Assert
    assert!(result.is_success());
    assert_eq!(
        provider.opened_endpoints(),
        vec![Endpoint::Tcp {
            host: "192.168.1.40".into(),
            port: 9100
        }]
    );
    assert_eq!(
        facade.handle("getActiveConnection", &Value::Null).await.value(),
        Some(&json!({"isConnected": true, "type": "tcp"}))
    );
}

#[tokio::test]
async fn test_blank_identifier_is_missing_argument() {
    let (provider, _, facade) = mock_facade();

    let result = facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "   "}))
        .await;

    assert_eq!(result.code(), Some(ErrorCode::MissingArgument));
    assert!(provider.opened_endpoints().is_empty());
}

#[tokio::test]
async fn test_connecting_again_replaces_previous_session() {
    // Arrange
    let (provider, _, facade) = mock_facade();
    facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "10.0.0.5"}))
        .await;

    // Act
    facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "10.0.0.6:6101"}))
        .await;
    facade.handle("sendCommands", &json!({"commands": "^XA^XZ"})).await;

    // Assert: only the second stream is open and received the bytes.
    let first = provider.stream_log(0);
    let second = provider.stream_log(1);
    assert_eq!(first.close_calls, 1);
    assert!(first.written.is_empty());
    assert!(second.open);
    assert_eq!(second.written, vec![b"^XA^XZ".to_vec()]);
}

// ── Send / disconnect ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_without_connection_is_not_connected() {
    let (_, _, facade) = mock_facade();

    let result = facade.handle("sendCommands", &json!({"commands": "~WC"})).await;

    assert_eq!(result.code(), Some(ErrorCode::NotConnected));
}

#[tokio::test]
async fn test_send_allows_empty_command_string() {
    let (provider, _, facade) = mock_facade();
    facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "10.0.0.5"}))
        .await;

    let empty = facade.handle("sendCommands", &json!({"commands": ""})).await;
    let missing = facade.handle("sendCommands", &json!({})).await;

    assert!(empty.is_success());
    assert_eq!(missing.code(), Some(ErrorCode::MissingArgument));
    assert_eq!(provider.stream_log(0).written, vec![Vec::<u8>::new()]);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    // Arrange
    let (provider, _, facade) = mock_facade();
    facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "10.0.0.5"}))
        .await;

    // Act
    let first = facade.handle("disconnect", &Value::Null).await;
    let second = facade.handle("disconnect", &Value::Null).await;

    // Assert
    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(provider.stream_log(0).close_calls, 1);
    assert_eq!(
        facade.handle("isConnected", &Value::Null).await.value(),
        Some(&json!(false))
    );
}

#[tokio::test]
async fn test_connection_queries_answer_while_send_is_stuck() {
    // Arrange: the printer never drains the write.
    let (provider, _, facade) = mock_facade();
    provider.set_stream_behavior(StreamBehavior {
        stall_write: true,
        ..StreamBehavior::default()
    });
    let facade = Arc::new(facade);
    facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": "10.0.0.5"}))
        .await;
    let sending = {
        let facade = Arc::clone(&facade);
        tokio::spawn(async move { facade.handle("sendCommands", &json!({"commands": "~HS"})).await })
    };
    tokio::task::yield_now().await;

    // Act
    let connected = tokio::time::timeout(
        Duration::from_secs(2),
        facade.handle("isConnected", &Value::Null),
    )
    .await;
    let active = tokio::time::timeout(
        Duration::from_secs(2),
        facade.handle("getActiveConnection", &Value::Null),
    )
    .await;

    // Assert
    assert_eq!(connected.unwrap().value(), Some(&json!(true)));
    assert_eq!(
        active.unwrap().value(),
        Some(&json!({"isConnected": true, "type": "tcp"}))
    );
    assert!(!sending.is_finished());
    sending.abort();
}

// ── Discovery deadlines ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_discovery_resolves_when_provider_never_starts_scan() {
    let (provider, _, facade) = mock_facade();
    provider.script(&ScanKind::LocalBroadcast, ScanScript::new().stall_start());

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        facade.handle("discoverPrinters", &Value::Null),
    )
    .await;

    assert_eq!(result.unwrap().value(), Some(&json!([])));
}

// ── Permission gating ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bluetooth_discovery_without_permissions_never_scans() {
    // Arrange
    let (provider, perms, facade) = mock_facade();
    perms.revoke(Permission::BluetoothScan);

    // Act
    let classic = facade.handle("discoverBluetoothPrinters", &Value::Null).await;
    let native = facade.handle("discoverBluetoothNative", &Value::Null).await;

    // Assert
    assert_eq!(classic.code(), Some(ErrorCode::MissingPermissions));
    assert_eq!(native.code(), Some(ErrorCode::MissingPermissions));
    assert!(provider.scan_calls().is_empty());
}

#[tokio::test]
async fn test_direct_ble_checks_permissions_before_address() {
    let (_, perms, facade) = mock_facade();
    perms.revoke(Permission::BluetoothScan);

    let no_perms = facade.handle("testDirectBleConnection", &json!({})).await;
    perms.grant(Permission::BluetoothScan);
    let no_mac = facade.handle("testDirectBleConnection", &json!({})).await;

    assert_eq!(no_perms.code(), Some(ErrorCode::MissingPermissions));
    assert_eq!(no_mac.code(), Some(ErrorCode::MissingMacAddress));
}

#[tokio::test]
async fn test_network_discovery_needs_no_permissions() {
    let provider = Arc::new(MockProvider::new());
    let facade = PluginFacade::new(
        Arc::<MockProvider>::clone(&provider),
        Arc::new(MockPermissions::none(33)),
        &AppConfig::default(),
    );

    let result = facade.handle("discoverNetworkPrintersAuto", &Value::Null).await;

    assert_eq!(result.value(), Some(&json!([])));
    assert_eq!(provider.scan_calls(), vec![ScanKind::NetworkAuto]);
}

// ── Real network provider ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_commands_reach_a_real_tcp_printer() {
    // Arrange: a loopback listener stands in for the printer.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let printer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        received
    });
    let facade = PluginFacade::new(
        Arc::new(NetworkProvider::new()),
        Arc::new(MockPermissions::none(33)),
        &AppConfig::default(),
    );

    // Act
    let connect = facade
        .handle("connect", &json!({"interfaceType": "tcp", "identifier": addr.to_string()}))
        .await;
    let send = facade.handle("sendCommands", &json!({"commands": "~HS"})).await;
    let disconnect = facade.handle("disconnect", &Value::Null).await;

    // Assert
    assert!(connect.is_success());
    assert!(send.is_success());
    assert!(disconnect.is_success());
    assert_eq!(printer.await.unwrap(), b"~HS".to_vec());
}
