//! Scriptable capability provider and permission source for tests.
//!
//! [`MockProvider`] replays a [`ScanScript`] per scan kind on a Tokio task and
//! records every call, so tests can assert both on results and on what the
//! host asked the "SDK" to do (for example, that no scan was started when a
//! permission was missing).  [`MockPermissions`] is a mutable permission set.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use printlink_core::{Endpoint, PairedDevice, RawDevice, ScanKind, UsbDeviceInfo};
use tokio::sync::Notify;

use crate::application::permissions::{Permission, PermissionSource};
use crate::application::provider::{
    ByteStream, DeviceProvider, OpenOptions, ProviderError, RadioStatus, ScanEvent, ScanHandle,
    ScanSink, StatusError,
};

// ── Scan scripts ──────────────────────────────────────────────────────────────

/// How `start_scan` itself should fail, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFailure {
    PermissionDenied,
    Unsupported,
    Failed,
}

impl StartFailure {
    fn to_error(self) -> ProviderError {
        match self {
            StartFailure::PermissionDenied => ProviderError::PermissionDenied("scan refused".into()),
            StartFailure::Unsupported => ProviderError::Unsupported("scan kind".into()),
            StartFailure::Failed => ProviderError::Failed("scanner crashed".into()),
        }
    }
}

/// The sequence of events a mock scan delivers.
#[derive(Debug, Clone, Default)]
pub struct ScanScript {
    events: Vec<(Duration, ScanEvent)>,
    hang: bool,
    after_cancel: Vec<ScanEvent>,
    start_failure: Option<StartFailure>,
    stall_start: bool,
}

impl ScanScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `raw` immediately after the previous event.
    pub fn found(self, raw: RawDevice) -> Self {
        self.found_after(Duration::ZERO, raw)
    }

    /// Reports `raw` after waiting `delay`.
    pub fn found_after(mut self, delay: Duration, raw: RawDevice) -> Self {
        self.events.push((delay, ScanEvent::Found(raw)));
        self
    }

    pub fn finish(self) -> Self {
        self.finish_after(Duration::ZERO)
    }

    pub fn finish_after(mut self, delay: Duration) -> Self {
        self.events.push((delay, ScanEvent::Finished));
        self
    }

    pub fn fail(mut self, reason: &str) -> Self {
        self.events.push((Duration::ZERO, ScanEvent::Failed(reason.to_string())));
        self
    }

    /// Keeps the sink open after the scripted events until the scan is cancelled.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Delivers `event` right after cancellation, like a provider that keeps
    /// calling back briefly.
    pub fn after_cancel(mut self, event: ScanEvent) -> Self {
        self.after_cancel.push(event);
        self
    }

    pub fn reject_start(mut self, failure: StartFailure) -> Self {
        self.start_failure = Some(failure);
        self
    }

    /// `start_scan` itself never returns.
    pub fn stall_start(mut self) -> Self {
        self.stall_start = true;
        self
    }
}

struct MockScanHandle {
    cancelled: Arc<Notify>,
    cancel_count: Arc<AtomicUsize>,
}

impl ScanHandle for MockScanHandle {
    fn cancel(&mut self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        self.cancelled.notify_one();
    }
}

// ── Byte streams ──────────────────────────────────────────────────────────────

/// How streams opened by the mock behave.
#[derive(Debug, Clone)]
pub struct StreamBehavior {
    pub fail_write: bool,
    /// `write_all` never completes.
    pub stall_write: bool,
    pub fail_close: bool,
    /// Whether a freshly opened stream reports itself as open.
    pub reports_open: bool,
    pub status: Result<String, StatusError>,
}

impl Default for StreamBehavior {
    fn default() -> Self {
        Self {
            fail_write: false,
            stall_write: false,
            fail_close: false,
            reports_open: true,
            status: Ok("ready".to_string()),
        }
    }
}

/// What happened to one opened stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamLog {
    pub written: Vec<Vec<u8>>,
    pub close_calls: usize,
    pub open: bool,
}

struct MockStream {
    log: Arc<Mutex<StreamLog>>,
    behavior: StreamBehavior,
}

#[async_trait]
impl ByteStream for MockStream {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProviderError> {
        if self.behavior.stall_write {
            std::future::pending::<()>().await;
        }
        if self.behavior.fail_write {
            return Err(ProviderError::Failed("broken pipe".into()));
        }
        self.log.lock().expect("lock poisoned").written.push(bytes.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        let mut log = self.log.lock().expect("lock poisoned");
        log.close_calls += 1;
        log.open = false;
        if self.behavior.fail_close {
            return Err(ProviderError::Failed("close refused".into()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.log.lock().expect("lock poisoned").open
    }

    async fn query_status(&mut self) -> Result<String, StatusError> {
        self.behavior.status.clone()
    }
}

// ── MockProvider ──────────────────────────────────────────────────────────────

/// A scriptable, call-recording [`DeviceProvider`].
pub struct MockProvider {
    scripts: Mutex<HashMap<&'static str, ScanScript>>,
    scan_calls: Mutex<Vec<ScanKind>>,
    cancel_count: Arc<AtomicUsize>,
    radio: Mutex<RadioStatus>,
    paired: Mutex<Vec<PairedDevice>>,
    usb: Mutex<Option<Vec<UsbDeviceInfo>>>,
    usb_permission_requests: Mutex<Vec<String>>,
    fail_usb_permission_request: AtomicBool,
    stall_paired: AtomicBool,
    fail_open: AtomicBool,
    stream_behavior: Mutex<StreamBehavior>,
    opened: Mutex<Vec<(Endpoint, OpenOptions, Arc<Mutex<StreamLog>>)>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A provider with a ready radio, no paired devices, an empty USB bus, and
    /// scans that finish immediately with no results.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            scan_calls: Mutex::new(Vec::new()),
            cancel_count: Arc::new(AtomicUsize::new(0)),
            radio: Mutex::new(RadioStatus::Ready),
            paired: Mutex::new(Vec::new()),
            usb: Mutex::new(Some(Vec::new())),
            usb_permission_requests: Mutex::new(Vec::new()),
            fail_usb_permission_request: AtomicBool::new(false),
            stall_paired: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            stream_behavior: Mutex::new(StreamBehavior::default()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Installs the script replayed by every scan of `kind`'s variant.
    pub fn script(&self, kind: &ScanKind, script: ScanScript) {
        self.scripts.lock().expect("lock poisoned").insert(kind.name(), script);
    }

    pub fn set_radio(&self, status: RadioStatus) {
        *self.radio.lock().expect("lock poisoned") = status;
    }

    pub fn set_paired(&self, devices: Vec<PairedDevice>) {
        *self.paired.lock().expect("lock poisoned") = devices;
    }

    /// `None` simulates a host without a USB service.
    pub fn set_usb_devices(&self, devices: Option<Vec<UsbDeviceInfo>>) {
        *self.usb.lock().expect("lock poisoned") = devices;
    }

    pub fn set_fail_usb_permission_request(&self, fail: bool) {
        self.fail_usb_permission_request.store(fail, Ordering::SeqCst);
    }

    /// Makes `paired_devices` never return.
    pub fn set_stall_paired(&self, stall: bool) {
        self.stall_paired.store(stall, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_stream_behavior(&self, behavior: StreamBehavior) {
        *self.stream_behavior.lock().expect("lock poisoned") = behavior;
    }

    pub fn scan_calls(&self) -> Vec<ScanKind> {
        self.scan_calls.lock().expect("lock poisoned").clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    pub fn opened_endpoints(&self) -> Vec<Endpoint> {
        self.opened
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(ep, _, _)| ep.clone())
            .collect()
    }

    pub fn open_options(&self, index: usize) -> OpenOptions {
        self.opened.lock().expect("lock poisoned")[index].1
    }

    /// Snapshot of the `index`-th opened stream.
    pub fn stream_log(&self, index: usize) -> StreamLog {
        let opened = self.opened.lock().expect("lock poisoned");
        let log = opened[index].2.lock().expect("lock poisoned").clone();
        log
    }

    pub fn usb_permission_requests(&self) -> Vec<String> {
        self.usb_permission_requests.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl DeviceProvider for MockProvider {
    async fn start_scan(
        &self,
        kind: &ScanKind,
        sink: ScanSink,
    ) -> Result<Box<dyn ScanHandle>, ProviderError> {
        self.scan_calls.lock().expect("lock poisoned").push(kind.clone());
        let script = self
            .scripts
            .lock()
            .expect("lock poisoned")
            .get(kind.name())
            .cloned()
            .unwrap_or_else(|| ScanScript::new().finish());

        if script.stall_start {
            std::future::pending::<()>().await;
        }
        if let Some(failure) = script.start_failure {
            return Err(failure.to_error());
        }

        let cancelled = Arc::new(Notify::new());
        let on_cancel = Arc::clone(&cancelled);
        tokio::spawn(async move {
            for (delay, event) in script.events {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = sink.send(event);
            }
            if script.hang {
                on_cancel.notified().await;
                for event in script.after_cancel {
                    let _ = sink.send(event);
                }
            }
        });

        Ok(Box::new(MockScanHandle {
            cancelled,
            cancel_count: Arc::clone(&self.cancel_count),
        }))
    }

    async fn open(
        &self,
        endpoint: &Endpoint,
        options: OpenOptions,
    ) -> Result<Box<dyn ByteStream>, ProviderError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ProviderError::Failed(format!("cannot reach {endpoint}")));
        }
        let behavior = self.stream_behavior.lock().expect("lock poisoned").clone();
        let log = Arc::new(Mutex::new(StreamLog {
            open: behavior.reports_open,
            ..StreamLog::default()
        }));
        self.opened
            .lock()
            .expect("lock poisoned")
            .push((endpoint.clone(), options, Arc::clone(&log)));
        Ok(Box::new(MockStream { log, behavior }))
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, ProviderError> {
        if self.stall_paired.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(self.paired.lock().expect("lock poisoned").clone())
    }

    fn radio_status(&self) -> RadioStatus {
        *self.radio.lock().expect("lock poisoned")
    }

    async fn usb_devices(&self) -> Result<Vec<UsbDeviceInfo>, ProviderError> {
        self.usb
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("no USB service".into()))
    }

    async fn request_usb_permission(&self, device_name: &str) -> Result<(), ProviderError> {
        self.usb_permission_requests
            .lock()
            .expect("lock poisoned")
            .push(device_name.to_string());
        if self.fail_usb_permission_request.load(Ordering::SeqCst) {
            return Err(ProviderError::Failed("permission dialog unavailable".into()));
        }
        Ok(())
    }
}

// ── MockPermissions ───────────────────────────────────────────────────────────

/// A mutable [`PermissionSource`].
pub struct MockPermissions {
    granted: Mutex<HashSet<Permission>>,
    level: AtomicU32,
    usb_granted: Mutex<HashSet<String>>,
}

impl MockPermissions {
    /// Nothing granted.
    pub fn none(level: u32) -> Self {
        Self {
            granted: Mutex::new(HashSet::new()),
            level: AtomicU32::new(level),
            usb_granted: Mutex::new(HashSet::new()),
        }
    }

    /// Every runtime permission granted; no USB devices granted.
    pub fn all_granted(level: u32) -> Self {
        let perms = Self::none(level);
        for p in [
            Permission::CoarseLocation,
            Permission::FineLocation,
            Permission::BluetoothScan,
            Permission::BluetoothConnect,
            Permission::Bluetooth,
            Permission::BluetoothAdmin,
        ] {
            perms.grant(p);
        }
        perms
    }

    pub fn grant(&self, permission: Permission) {
        self.granted.lock().expect("lock poisoned").insert(permission);
    }

    pub fn revoke(&self, permission: Permission) {
        self.granted.lock().expect("lock poisoned").remove(&permission);
    }

    pub fn grant_usb(&self, device_name: &str) {
        self.usb_granted
            .lock()
            .expect("lock poisoned")
            .insert(device_name.to_string());
    }

    pub fn set_level(&self, level: u32) {
        self.level.store(level, Ordering::SeqCst);
    }
}

impl PermissionSource for MockPermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.lock().expect("lock poisoned").contains(&permission)
    }

    fn platform_level(&self) -> u32 {
        self.level.load(Ordering::SeqCst)
    }

    fn usb_permission_granted(&self, device_name: &str) -> bool {
        self.usb_granted.lock().expect("lock poisoned").contains(device_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printlink_core::Transport;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_mock_provider_replays_script_and_records_call() {
        // Arrange
        let provider = MockProvider::new();
        provider.script(
            &ScanKind::Usb,
            ScanScript::new()
                .found(RawDevice::new(Transport::Usb, "/dev/bus/usb/001/004"))
                .finish(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        let _handle = provider.start_scan(&ScanKind::Usb, tx).await.unwrap();

        // Assert
        assert!(matches!(rx.recv().await, Some(ScanEvent::Found(_))));
        assert_eq!(rx.recv().await, Some(ScanEvent::Finished));
        assert_eq!(provider.scan_calls(), vec![ScanKind::Usb]);
    }

    #[tokio::test]
    async fn test_hanging_script_releases_sink_after_cancel() {
        let provider = MockProvider::new();
        provider.script(
            &ScanKind::Bluetooth,
            ScanScript::new().hang().after_cancel(ScanEvent::Finished),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handle = provider.start_scan(&ScanKind::Bluetooth, tx).await.unwrap();
        handle.cancel();

        assert_eq!(rx.recv().await, Some(ScanEvent::Finished));
        assert_eq!(rx.recv().await, None, "sink must be dropped after the script ends");
        assert_eq!(provider.cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_stream_records_writes_and_close() {
        let provider = MockProvider::new();
        let ep = Endpoint::Tcp { host: "10.0.0.5".into(), port: 9100 };
        let mut stream = provider
            .open(&ep, OpenOptions { timeout: Duration::from_secs(1) })
            .await
            .unwrap();

        stream.write_all(b"^XA^XZ").await.unwrap();
        stream.close().await.unwrap();

        let log = provider.stream_log(0);
        assert_eq!(log.written, vec![b"^XA^XZ".to_vec()]);
        assert_eq!(log.close_calls, 1);
        assert!(!log.open);
    }

    #[test]
    fn test_mock_permissions_grant_and_revoke() {
        let perms = MockPermissions::all_granted(33);
        perms.revoke(Permission::BluetoothScan);
        assert!(!perms.is_granted(Permission::BluetoothScan));
        assert!(perms.is_granted(Permission::FineLocation));
        perms.grant_usb("/dev/bus/usb/001/004");
        assert!(perms.usb_permission_granted("/dev/bus/usb/001/004"));
    }
}
