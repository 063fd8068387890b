//! DNS server setup and lifecycle management.

use async_trait::async_trait;
use hickory_server::ServerFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::DnsConfig;
use crate::error::Error;
use crate::handler::DnsHandler;
use crate::resolver::{DelegateResolver, SystemResolver};

/// Source of the sockets the DNS server binds to.
///
/// A virtual network stack hands out sockets on its own gateway address;
/// [`HostNetwork`] binds them on the host.
#[async_trait]
pub trait NetworkStack: Send + Sync {
    /// Listen for TCP connections on `addr`.
    async fn listen_tcp(&self, addr: SocketAddr) -> io::Result<TcpListener>;

    /// Open a UDP socket receiving datagrams sent to `addr`.
    async fn dial_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket>;
}

/// Sockets on the host's own network stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostNetwork;

#[async_trait]
impl NetworkStack for HostNetwork {
    async fn listen_tcp(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }

    async fn dial_udp(&self, addr: SocketAddr) -> io::Result<UdpSocket> {
        UdpSocket::bind(addr).await
    }
}

/// DNS server answering from configured zones and a delegate resolver.
pub struct DnsServer {
    config: DnsConfig,
    handler: DnsHandler,
}

impl DnsServer {
    /// Create a server, compiling zones and building the system resolver.
    pub fn new(config: DnsConfig) -> Result<Self, Error> {
        let resolver = SystemResolver::new(&config.upstream)?;
        Self::with_resolver(config, Arc::new(resolver))
    }

    /// Create a server with an explicit delegate resolver.
    pub fn with_resolver(
        config: DnsConfig,
        resolver: Arc<dyn DelegateResolver>,
    ) -> Result<Self, Error> {
        let zones = config.compile_zones()?;
        Ok(Self {
            handler: DnsHandler::new(zones, resolver),
            config,
        })
    }

    /// The request handler.
    pub fn handler(&self) -> &DnsHandler {
        &self.handler
    }

    /// Serve on sockets from `network` until `shutdown` is cancelled.
    pub async fn run<N>(self, network: &N, shutdown: CancellationToken) -> Result<(), Error>
    where
        N: NetworkStack + ?Sized,
    {
        let listen_addr = self.config.listen_addr;
        info!(
            %listen_addr,
            zones = self.handler.zones().len(),
            upstream = ?self.config.upstream,
            "Starting DNS server"
        );

        let mut server = ServerFuture::new(self.handler);

        // Bind UDP
        let udp_socket = network.dial_udp(listen_addr).await?;
        info!(addr = %listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = network.listen_tcp(listen_addr).await?;
        info!(addr = %listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, self.config.tcp_timeout());

        info!("DNS server ready to serve queries");

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        info!("DNS server stopped");
        Ok(())
    }
}
