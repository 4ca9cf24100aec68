//! TCP-only capability provider.
//!
//! Opens raw port-9100 byte streams with `tokio::net::TcpStream` and
//! implements the subnet sweep by probing each candidate address with a
//! bounded TCP connect.  Every other scan kind, Bluetooth, and USB are
//! reported as unsupported or unavailable so the host still runs on machines
//! without a printer SDK.
//!
//! # Subnet range syntax
//!
//! | Form            | Hosts probed          |
//! |-----------------|-----------------------|
//! | `192.168.1.*`   | `.1` through `.254`   |
//! | `192.168.1.10-20` | `.10` through `.20` |
//! | `192.168.1.42`  | that host only        |

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use printlink_core::{
    Endpoint, PairedDevice, RawDevice, ScanKind, Transport, UsbDeviceInfo, DEFAULT_NETWORK_PORT,
    KEY_PORT_NUMBER,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::application::provider::{
    ByteStream, DeviceProvider, OpenOptions, ProviderError, RadioStatus, ScanEvent, ScanHandle,
    ScanSink, StatusError,
};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_MAX_PROBES: usize = 32;

/// Expands a subnet range expression into the addresses to probe.
pub fn parse_subnet_range(range: &str) -> Result<Vec<Ipv4Addr>, ProviderError> {
    let invalid = || ProviderError::Failed(format!("invalid subnet range: {range:?}"));
    let range = range.trim();
    let (prefix, last) = range.rsplit_once('.').ok_or_else(invalid)?;

    let octets: Vec<u8> = prefix
        .split('.')
        .map(|o| o.parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    let &[a, b, c] = octets.as_slice() else {
        return Err(invalid());
    };

    let (first, end) = match last {
        "*" => (1, 254),
        _ => match last.split_once('-') {
            Some((lo, hi)) => {
                let lo = lo.trim().parse::<u8>().map_err(|_| invalid())?;
                let hi = hi.trim().parse::<u8>().map_err(|_| invalid())?;
                if lo > hi {
                    return Err(invalid());
                }
                (lo, hi)
            }
            None => {
                let host = last.parse::<u8>().map_err(|_| invalid())?;
                (host, host)
            }
        },
    };

    Ok((first..=end).map(|d| Ipv4Addr::new(a, b, c, d)).collect())
}

// ── Scan handle ───────────────────────────────────────────────────────────────

struct SweepHandle {
    task: AbortHandle,
}

impl ScanHandle for SweepHandle {
    fn cancel(&mut self) {
        debug!("aborting subnet sweep");
        self.task.abort();
    }
}

// ── Byte stream ───────────────────────────────────────────────────────────────

/// A raw TCP connection to a printer's print port.
pub struct TcpByteStream {
    stream: Option<TcpStream>,
    peer: String,
}

#[async_trait]
impl ByteStream for TcpByteStream {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProviderError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ProviderError::Failed(format!("connection to {} is closed", self.peer)))?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        debug!(peer = %self.peer, len = bytes.len(), "raw TCP write");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProviderError> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
            debug!(peer = %self.peer, "raw TCP connection closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn query_status(&mut self) -> Result<String, StatusError> {
        Err(StatusError::Query(
            "status queries are not available over raw TCP".into(),
        ))
    }
}

// ── Provider ──────────────────────────────────────────────────────────────────

pub struct NetworkProvider {
    probe_port: u16,
    probe_timeout: Duration,
    max_probes: usize,
}

impl Default for NetworkProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkProvider {
    pub fn new() -> Self {
        Self {
            probe_port: DEFAULT_NETWORK_PORT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_probes: DEFAULT_MAX_PROBES,
        }
    }

    /// Overrides the port and per-host timeout used by the subnet sweep.
    pub fn with_probe(mut self, port: u16, timeout: Duration) -> Self {
        self.probe_port = port;
        self.probe_timeout = timeout;
        self
    }

    fn sweep(&self, hosts: Vec<Ipv4Addr>, sink: ScanSink) -> AbortHandle {
        let port = self.probe_port;
        let timeout = self.probe_timeout;
        let limit = Arc::new(Semaphore::new(self.max_probes.max(1)));

        let task = tokio::spawn(async move {
            let total = hosts.len();
            let mut probes = JoinSet::new();
            for ip in hosts {
                let limit = Arc::clone(&limit);
                probes.spawn(async move {
                    let _permit = limit.acquire_owned().await.ok()?;
                    match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
                        Ok(Ok(_)) => Some(ip),
                        _ => None,
                    }
                });
            }

            let mut found = 0usize;
            while let Some(joined) = probes.join_next().await {
                if let Ok(Some(ip)) = joined {
                    found += 1;
                    let raw = RawDevice::new(Transport::Network, ip.to_string())
                        .with_data(KEY_PORT_NUMBER, port.to_string());
                    if sink.send(ScanEvent::Found(raw)).is_err() {
                        debug!("sweep result no longer wanted");
                        return;
                    }
                }
            }
            info!(total, found, "subnet sweep finished");
            let _ = sink.send(ScanEvent::Finished);
        });
        task.abort_handle()
    }
}

#[async_trait]
impl DeviceProvider for NetworkProvider {
    async fn start_scan(
        &self,
        kind: &ScanKind,
        sink: ScanSink,
    ) -> Result<Box<dyn ScanHandle>, ProviderError> {
        match kind {
            ScanKind::Subnet { range } => {
                let hosts = parse_subnet_range(range)?;
                info!(%range, hosts = hosts.len(), port = self.probe_port, "starting subnet sweep");
                Ok(Box::new(SweepHandle {
                    task: self.sweep(hosts, sink),
                }))
            }
            other => Err(ProviderError::Unsupported(format!("{other} scans"))),
        }
    }

    async fn open(
        &self,
        endpoint: &Endpoint,
        options: OpenOptions,
    ) -> Result<Box<dyn ByteStream>, ProviderError> {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(ProviderError::Unsupported(format!("{endpoint}")));
        };
        let peer = format!("{host}:{port}");
        info!(%peer, "connecting via raw TCP");

        let stream = tokio::time::timeout(options.timeout, TcpStream::connect((host.as_str(), *port)))
            .await
            .map_err(|_| {
                warn!(%peer, "raw TCP connect timed out");
                ProviderError::Timeout(options.timeout)
            })??;
        Ok(Box::new(TcpByteStream {
            stream: Some(stream),
            peer,
        }))
    }

    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, ProviderError> {
        Ok(Vec::new())
    }

    fn radio_status(&self) -> RadioStatus {
        RadioStatus::NoAdapter
    }

    async fn usb_devices(&self) -> Result<Vec<UsbDeviceInfo>, ProviderError> {
        Err(ProviderError::Unavailable("no USB service on this host".into()))
    }

    async fn request_usb_permission(&self, _device_name: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unavailable("no USB service on this host".into()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
