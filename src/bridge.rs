//! Duplex pump between a local interface and a framed byte stream.
//!
//! Two tasks run independently:
//!
//! ```text
//!            egress: recv -> encode -> write
//!   ┌────────────┐ ─────────────────────────▶ ┌────────────┐
//!   │ FrameDevice│                            │   stream   │
//!   └────────────┘ ◀───────────────────────── └────────────┘
//!            ingress: read -> decode -> send
//! ```
//!
//! Both share a [`CancellationToken`]. The first direction to fail cancels it,
//! which stops the other one, and [`BridgeHandle::wait`] reports that first
//! error.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use smoltcp::wire::{EthernetFrame, PrettyPrinter};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::codec::{self, LENGTH_PREFIX_LEN};
use crate::device::FrameDevice;
use crate::error::TransportError;
use crate::metrics;

/// Ethernet header bytes carried on top of the MTU.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Direction of frame flow through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Interface to stream.
    Egress,
    /// Stream to interface.
    Ingress,
}

impl Direction {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Egress => "egress",
            Direction::Ingress => "ingress",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame pump for one interface.
pub struct Bridge<D> {
    device: Arc<D>,
    max_frame_len: usize,
    debug: bool,
}

impl<D: FrameDevice> Bridge<D> {
    /// Create a bridge for `device`, accepting frames up to `mtu` plus the
    /// Ethernet header.
    pub fn new(device: D, mtu: usize) -> Self {
        Self {
            device: Arc::new(device),
            max_frame_len: mtu + ETHERNET_HEADER_LEN,
            debug: false,
        }
    }

    /// Log the decoded structure of every frame passing through.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Largest frame accepted in either direction.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Start pumping between the device and `stream`.
    ///
    /// Cancelling `cancel` stops both directions.
    pub fn start<S>(self, stream: S, cancel: CancellationToken) -> BridgeHandle
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut tasks = JoinSet::new();

        tasks.spawn(run_direction(
            Direction::Egress,
            cancel.clone(),
            pump_egress(self.device.clone(), writer, self.max_frame_len, self.debug),
        ));
        tasks.spawn(run_direction(
            Direction::Ingress,
            cancel.clone(),
            pump_ingress(self.device, reader, self.max_frame_len, self.debug),
        ));

        info!(max_frame_len = self.max_frame_len, "bridge started");
        BridgeHandle { tasks, cancel }
    }
}

/// Running bridge.
pub struct BridgeHandle {
    tasks: JoinSet<Result<(), TransportError>>,
    cancel: CancellationToken,
}

impl BridgeHandle {
    /// Ask both directions to stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for both directions to stop.
    ///
    /// Returns the first error reported, or `Ok(())` when the bridge was
    /// cancelled without one.
    pub async fn wait(mut self) -> Result<(), TransportError> {
        let mut first = None;

        while let Some(joined) = self.tasks.join_next().await {
            self.cancel.cancel();

            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => TransportError::io("run bridge task", io::Error::other(e)),
            };
            if first.is_none() {
                first = Some(err);
            } else {
                debug!(error = %err, "ignoring error after bridge shutdown");
            }
        }

        info!("bridge stopped");
        first.map_or(Ok(()), Err)
    }
}

async fn run_direction<F>(
    direction: Direction,
    cancel: CancellationToken,
    pump: F,
) -> Result<(), TransportError>
where
    F: Future<Output = Result<(), TransportError>>,
{
    let result = tokio::select! {
        result = pump => result,
        _ = cancel.cancelled() => {
            debug!(%direction, "bridge direction cancelled");
            Ok(())
        }
    };

    if let Err(ref e) = result {
        error!(%direction, error = %e, "bridge direction failed");
        metrics::record_bridge_error(direction);
        cancel.cancel();
    }
    result
}

async fn pump_egress<D, W>(
    device: Arc<D>,
    mut writer: W,
    max_frame_len: usize,
    debug: bool,
) -> Result<(), TransportError>
where
    D: FrameDevice,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; max_frame_len];
    let mut scratch = BytesMut::with_capacity(LENGTH_PREFIX_LEN + max_frame_len);

    debug!("waiting for frames from interface");
    loop {
        let n = device
            .recv(&mut buf)
            .await
            .map_err(|e| TransportError::io("read from interface", e))?;
        let frame = &buf[..n];

        if debug {
            log_frame(Direction::Egress, frame);
        }

        codec::write_frame(&mut writer, frame, &mut scratch).await?;
        metrics::record_frame(Direction::Egress, n);
    }
}

async fn pump_ingress<D, R>(
    device: Arc<D>,
    mut reader: R,
    max_frame_len: usize,
    debug: bool,
) -> Result<(), TransportError>
where
    D: FrameDevice,
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(max_frame_len);

    loop {
        codec::read_frame(&mut reader, &mut buf).await?;

        if buf.len() > max_frame_len {
            return Err(TransportError::FrameTooLarge {
                len: buf.len(),
                limit: max_frame_len,
            });
        }
        if buf.is_empty() {
            trace!("dropping empty frame from stream");
            metrics::record_frame_dropped("empty");
            continue;
        }

        if debug {
            log_frame(Direction::Ingress, &buf);
        }

        device
            .send(&buf)
            .await
            .map_err(|e| TransportError::io("write to interface", e))?;
        metrics::record_frame(Direction::Ingress, buf.len());
    }
}

fn log_frame(direction: Direction, frame: &[u8]) {
    info!(
        %direction,
        len = frame.len(),
        "{}",
        PrettyPrinter::<EthernetFrame<&[u8]>>::new("", &frame)
    );
}
