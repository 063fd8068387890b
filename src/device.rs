//! Local link-layer interfaces the bridge can pump frames through.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

/// A local interface that reads and writes whole link-layer frames.
///
/// The bridge calls `recv` from one task and `send` from another, so
/// implementations must tolerate both running at the same time.
#[async_trait]
pub trait FrameDevice: Send + Sync + 'static {
    /// Receive one frame into `buf` and return its length.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Transmit one frame.
    async fn send(&self, frame: &[u8]) -> io::Result<()>;
}

/// In-process interface backed by channels.
///
/// Created in connected pairs: whatever one end sends, the other receives.
/// Dropping one end makes the other fail with `BrokenPipe`.
pub struct MemoryDevice {
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl MemoryDevice {
    /// Create two connected ends, each buffering up to `capacity` frames.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

#[async_trait]
impl FrameDevice for MemoryDevice {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let frame = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "peer device closed"))?;

        if frame.len() > buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes does not fit {} byte buffer", frame.len(), buf.len()),
            ));
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    async fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(frame))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer device closed"))
    }
}
