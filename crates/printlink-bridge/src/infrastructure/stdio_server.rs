//! Stdio server: reader loop, worker dispatch, and the delivery writer.
//!
//! This module is responsible for:
//!
//! 1. Writing a `ready` frame before reading anything.
//! 2. Reading stdin line by line and decoding each line into a frame.
//! 3. Dispatching `call` frames to the plugin facade.  Quick queries are
//!    answered inline; everything else runs on the worker pool so a slow
//!    discovery never stalls the reader.
//! 4. Applying host notifications (`usbPermission`, `activity`) immediately,
//!    in arrival order.
//! 5. Writing every outbound frame from one place, so responses never
//!    interleave on stdout.
//! 6. Draining in-flight operations (bounded by `drain_timeout`) when stdin
//!    closes or the `running` flag is cleared, then shutting the facade down.
//!
//! [`serve`] is generic over the reader and writer so tests can drive it
//! with in-memory buffers; [`run_server`] binds it to the process's stdio.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use printlink_core::MethodResponse;
use printlink_host::infrastructure::ui_bridge::PluginFacade;
use printlink_host::infrastructure::worker_pool::WorkerPool;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::{decode_frame, encode_frame, reject_frame, BridgeError};
use crate::domain::config::BridgeConfig;
use crate::domain::messages::{InboundFrame, OutboundFrame};

/// How often the reader wakes up to check the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Serves the method channel on the process's stdin and stdout until stdin
/// closes or `running` is set to `false`.
pub async fn run_server(
    config: BridgeConfig,
    facade: Arc<PluginFacade>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    info!(workers = config.max_concurrent, "method channel listening on stdio");
    serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        facade,
        &config,
        running,
    )
    .await
}

/// Serves the method channel on `reader` / `writer`.
///
/// # Errors
///
/// Returns an error if reading the input fails or the output can no longer
/// be written.
pub async fn serve<R, W>(
    reader: R,
    mut writer: W,
    facade: Arc<PluginFacade>,
    config: &BridgeConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (pool, responses) = WorkerPool::new(config.max_concurrent);
    let (control, control_rx) = mpsc::unbounded_channel();
    let _ = control.send(OutboundFrame::Ready {
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let writing = write_frames(&mut writer, responses, control_rx);
    tokio::pin!(writing);

    // The reader owns the pool and the control sender; once it returns, the
    // writer ends as soon as every submitted operation has delivered.
    let read_outcome = tokio::select! {
        outcome = read_frames(reader, &facade, pool, control, &running) => outcome,
        written = &mut writing => {
            facade.shutdown().await;
            return written.context("failed writing to output");
        }
    };

    match timeout(config.drain_timeout, &mut writing).await {
        Ok(written) => written.context("failed writing to output")?,
        Err(_) => warn!(
            "in-flight operations did not finish within {:?}; abandoning them",
            config.drain_timeout
        ),
    }

    facade.shutdown().await;
    info!("method channel closed");
    read_outcome
}

// ── Reader ────────────────────────────────────────────────────────────────────

async fn read_frames<R>(
    reader: R,
    facade: &Arc<PluginFacade>,
    pool: WorkerPool,
    control: mpsc::UnboundedSender<OutboundFrame>,
    running: &AtomicBool,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; no longer reading requests");
            return Ok(());
        }

        // `next_line` is cancel safe, so timing it out loses no input.
        let line = match timeout(POLL_INTERVAL, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                info!("input closed");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e).context("failed reading input"),
            Err(_) => continue,
        };

        match decode_frame(&line) {
            Ok(frame) => dispatch(frame, facade, &pool).await,
            Err(BridgeError::Empty) => {}
            Err(e) => {
                warn!("rejecting frame: {e}");
                let _ = control.send(reject_frame(&line, &e));
            }
        }
    }
}

async fn dispatch(frame: InboundFrame, facade: &Arc<PluginFacade>, pool: &WorkerPool) {
    match frame {
        InboundFrame::Call { id, method, args } => {
            if PluginFacade::is_inline(&method) {
                let result = facade.handle(&method, &args).await;
                pool.deliver(id, result);
            } else {
                debug!(id, method = %method, "submitting call");
                let facade = Arc::clone(facade);
                pool.submit(id, async move { facade.handle(&method, &args).await });
            }
        }
        InboundFrame::UsbPermission {
            action,
            device_name,
            granted,
        } => {
            let matched = facade.on_usb_permission(&action, &device_name, granted);
            debug!(device = %device_name, granted, matched, "usb permission notification");
        }
        InboundFrame::Activity { attached: true } => facade.attach_activity(),
        InboundFrame::Activity { attached: false } => facade.detach_activity(),
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// The single writer: drains both channels until every sender is gone.
async fn write_frames<W>(
    writer: &mut W,
    mut responses: mpsc::UnboundedReceiver<MethodResponse>,
    mut control: mpsc::UnboundedReceiver<OutboundFrame>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            Some(frame) = control.recv() => frame,
            Some(response) = responses.recv() => OutboundFrame::from(response),
            else => break,
        };

        match encode_frame(&frame) {
            Ok(mut line) => {
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Err(e) => error!("failed to encode outbound frame: {e}"),
        }
    }
    Ok(())
}
