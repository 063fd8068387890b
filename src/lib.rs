//! vpnkit-bridge - connect a guest's TAP interface to a host-side virtual
//! network over a plain byte stream, and answer the guest's DNS.
//!
//! ## Features
//!
//! - Length-prefixed frame transport over stdio, a child process, TCP or Unix sockets
//! - Both pump directions stop together on the first failure
//! - Authoritative local zones with exact and pattern records and a catch-all address
//! - Delegation to the system resolver (or configured upstreams) for everything else
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────── guest ────────────────┐        ┌──────── host ────────┐
//! │                                       │        │                      │
//! │  ┌────────┐  frames  ┌─────────────┐  │ stream │  ┌────────────────┐  │
//! │  │  tap0  │◀────────▶│   Bridge    │◀─┼────────┼─▶│ network stack  │  │
//! │  └────────┘          │ (egress +   │  │ u16 LE │  │ (NAT, DHCP...) │  │
//! │                      │  ingress)   │  │ length │  └───────┬────────┘  │
//! │                      └─────────────┘  │ +frame │          │ :53       │
//! │                                       │        │  ┌───────▼────────┐  │
//! │                                       │        │  │   DnsServer    │  │
//! │                                       │        │  │ zones→delegate │  │
//! │                                       │        │  └────────────────┘  │
//! └───────────────────────────────────────┘        └──────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! host.internal.    → zone "internal.", record "host"  → A 192.168.1.1
//! other.internal.   → zone "internal.", no record      → default IP or NXDOMAIN
//! example.com. (A)  → no zone                          → delegate, IPv4 only
//! example.com. (NS) → no zone                          → delegate
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use vpnkit_bridge::{transport, Bridge, MemoryDevice, TransportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (_peer, device) = MemoryDevice::pair(64);
//!     let stream = transport::connect(&TransportConfig::Stdio).await.unwrap();
//!
//!     let handle = Bridge::new(device, 1500).start(stream, CancellationToken::new());
//!     if let Err(e) = handle.wait().await {
//!         eprintln!("bridge failed: {e}");
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod link;
pub mod metrics;
pub mod resolver;
pub mod server;
#[cfg(all(target_os = "linux", feature = "tap"))]
pub mod tap;
pub mod telemetry;
pub mod transport;
pub mod zone;

// Re-export main types
pub use bridge::{Bridge, BridgeHandle};
pub use config::{BridgeConfig, Config, DnsConfig, TelemetryConfig, TransportConfig, ZoneConfig};
pub use device::{FrameDevice, MemoryDevice};
pub use error::{ConfigError, Error, ResolveError, TransportError};
pub use handler::DnsHandler;
pub use resolver::{DelegateResolver, SystemResolver};
pub use server::{DnsServer, HostNetwork, NetworkStack};
pub use zone::{MatchResult, Zone};
