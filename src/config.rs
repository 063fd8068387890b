//! Configuration types for vpnkit-bridge.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::link::MacAddr;
use crate::zone::{self, Zone};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Frame bridge configuration.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Check every section, compiling zones to surface bad patterns early.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.validate()?;
        self.dns.compile_zones()?;
        Ok(())
    }
}

/// Frame bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name of the TAP interface to create.
    #[serde(default = "default_iface")]
    pub iface: String,

    /// Interface MTU. Frames may be this size plus the Ethernet header.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Hardware address assigned when the link is brought up.
    #[serde(default = "default_mac")]
    pub mac: Option<MacAddr>,

    /// Log the decoded structure of every bridged frame.
    #[serde(default)]
    pub debug: bool,

    /// Stream the frames are carried over.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Options handed to the host-side proxy when the transport spawns it.
    #[serde(default)]
    pub proxy: Option<ProxyOptions>,
}

/// Largest MTU whose frames still fit the 16-bit wire length.
pub const MAX_MTU: u16 = u16::MAX - crate::bridge::ETHERNET_HEADER_LEN as u16;

/// Smallest MTU an IPv4 link may use.
pub const MIN_MTU: u16 = 68;

impl BridgeConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iface.is_empty() {
            return Err(ConfigError::Invalid("bridge.iface must not be empty".into()));
        }
        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(ConfigError::Invalid(format!(
                "bridge.mtu must be between {} and {}, got {}",
                MIN_MTU, MAX_MTU, self.mtu
            )));
        }
        if let Some(ref proxy) = self.proxy {
            proxy.validate()?;
        }
        Ok(())
    }

    /// Transport with the proxy options appended to a spawned command.
    pub fn effective_transport(&self) -> TransportConfig {
        match (&self.transport, &self.proxy) {
            (TransportConfig::Command { program, args }, Some(proxy)) => {
                let mut args = args.clone();
                args.extend(proxy.to_args(self.debug));
                TransportConfig::Command {
                    program: program.clone(),
                    args,
                }
            }
            (transport, _) => transport.clone(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            iface: default_iface(),
            mtu: default_mtu(),
            mac: default_mac(),
            debug: false,
            transport: TransportConfig::default(),
            proxy: None,
        }
    }
}

fn default_iface() -> String {
    "tap0".to_string()
}

fn default_mtu() -> u16 {
    4000
}

fn default_mac() -> Option<MacAddr> {
    Some(MacAddr::new([0x5a, 0x94, 0xef, 0xe4, 0x0c, 0xee]))
}

/// Byte stream the bridge runs over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// This process's stdin and stdout.
    #[default]
    Stdio,
    /// Spawn a program and talk to its stdin and stdout.
    Command {
        /// Program to run.
        program: PathBuf,
        /// Arguments passed to the program.
        #[serde(default)]
        args: Vec<String>,
    },
    /// Connect to a TCP endpoint.
    Tcp {
        /// Remote address.
        addr: SocketAddr,
    },
    /// Connect to a Unix domain socket.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
}

/// Network layout the host-side proxy should build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyOptions {
    /// Virtual subnet in CIDR notation.
    #[serde(default = "default_subnet")]
    pub subnet: String,

    /// Gateway address inside the subnet; also where DNS listens.
    #[serde(default = "default_gateway_ip")]
    pub gateway_ip: Ipv4Addr,

    /// Address through which the guest reaches the host.
    #[serde(default = "default_host_ip")]
    pub host_ip: Ipv4Addr,

    /// Address leased to the guest.
    #[serde(default = "default_vm_ip")]
    pub vm_ip: Ipv4Addr,

    /// MTU of the proxy's virtual network.
    #[serde(default = "default_proxy_mtu")]
    pub mtu: u16,
}

impl ProxyOptions {
    /// Check the subnet notation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = || ConfigError::Invalid(format!("invalid proxy subnet {:?}", self.subnet));
        let (addr, prefix) = self.subnet.split_once('/').ok_or_else(invalid)?;
        addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        Ok(())
    }

    /// Command-line flags understood by the proxy.
    pub fn to_args(&self, debug: bool) -> Vec<String> {
        let mut args = vec![
            "-subnet".to_string(),
            self.subnet.clone(),
            "-gateway-ip".to_string(),
            self.gateway_ip.to_string(),
            "-host-ip".to_string(),
            self.host_ip.to_string(),
            "-vm-ip".to_string(),
            self.vm_ip.to_string(),
            "-mtu".to_string(),
            self.mtu.to_string(),
        ];
        if debug {
            args.push("-debug".to_string());
        }
        args
    }
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            subnet: default_subnet(),
            gateway_ip: default_gateway_ip(),
            host_ip: default_host_ip(),
            vm_ip: default_vm_ip(),
            mtu: default_proxy_mtu(),
        }
    }
}

fn default_subnet() -> String {
    "192.168.127.0/24".to_string()
}

fn default_gateway_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 127, 1)
}

fn default_host_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 127, 254)
}

fn default_vm_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 127, 2)
}

fn default_proxy_mtu() -> u16 {
    1500
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Idle timeout for TCP clients, in seconds.
    #[serde(default = "default_tcp_timeout_secs")]
    pub tcp_timeout_secs: u64,

    /// Upstream servers for names outside every zone.
    /// Empty means the system resolver configuration.
    #[serde(default)]
    pub upstream: Vec<SocketAddr>,

    /// Authoritative zones, consulted in order.
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

impl DnsConfig {
    /// TCP idle timeout as a duration.
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_timeout_secs)
    }

    /// Compile the configured zones.
    pub fn compile_zones(&self) -> Result<Vec<Zone>, ConfigError> {
        zone::compile_zones(&self.zones)
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tcp_timeout_secs: default_tcp_timeout_secs(),
            upstream: Vec::new(),
            zones: Vec::new(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((default_gateway_ip(), 53))
}

fn default_tcp_timeout_secs() -> u64 {
    30
}

/// One authoritative zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone suffix, e.g. "internal." (trailing dot optional).
    pub name: String,

    /// Answer for names in the zone that match no record.
    #[serde(default)]
    pub default_ip: Option<Ipv4Addr>,

    /// Records, matched in order.
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

/// One zone record. Exactly one of `name` and `regexp` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Exact label below the zone, e.g. "host".
    #[serde(default)]
    pub name: Option<String>,

    /// Pattern searched for in the label below the zone.
    #[serde(default)]
    pub regexp: Option<String>,

    /// Address returned for matching names.
    pub ip: Ipv4Addr,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "vpnkit_bridge=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "vpnkit-bridge".to_string()
}
