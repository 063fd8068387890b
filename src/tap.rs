//! Linux TAP interface backed by `tun-rs`.

use std::io;

use async_trait::async_trait;
use tracing::info;
use tun_rs::{AsyncDevice, DeviceBuilder, Layer};

use crate::device::FrameDevice;

/// A layer-2 TAP interface. Closed when dropped.
pub struct TapDevice {
    device: AsyncDevice,
    name: String,
}

impl TapDevice {
    /// Create the TAP interface `name` with the given MTU.
    pub fn create(name: &str, mtu: u16) -> io::Result<Self> {
        let device = DeviceBuilder::new()
            .name(name)
            .layer(Layer::L2)
            .mtu(mtu)
            .build_async()?;

        info!(iface = %name, mtu, "TAP device created");
        Ok(Self {
            device,
            name: name.to_string(),
        })
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl FrameDevice for TapDevice {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.recv(buf).await
    }

    async fn send(&self, frame: &[u8]) -> io::Result<()> {
        self.device.send(frame).await.map(|_| ())
    }
}
