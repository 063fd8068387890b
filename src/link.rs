//! Link configuration for the local interface.
//!
//! Uses the `ip` tool, so bringing a link up needs CAP_NET_ADMIN.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ConfigError;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Wrap raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Invalid(format!("invalid MAC address {:?}", s));
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Fail if an interface called `iface` already exists.
///
/// An existing interface of that name would take the bridge's traffic.
pub async fn verify_interface_absent(iface: &str) -> io::Result<()> {
    let path = Path::new("/sys/class/net").join(iface);
    if tokio::fs::try_exists(&path).await? {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("interface {} prevented this program to run", iface),
        ));
    }
    Ok(())
}

/// Set the hardware address of `iface` (if given) and bring it up.
pub async fn link_up(iface: &str, mac: Option<MacAddr>) -> io::Result<()> {
    if let Some(mac) = mac {
        ip(&["link", "set", "dev", iface, "address", &mac.to_string()]).await?;
        debug!(%iface, %mac, "set hardware address");
    }
    ip(&["link", "set", "dev", iface, "up"]).await?;
    info!(%iface, "link up");
    Ok(())
}

async fn ip(args: &[&str]) -> io::Result<()> {
    let output = Command::new("ip").args(args).output().await?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "ip {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
