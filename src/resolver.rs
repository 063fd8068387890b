//! Delegate resolution for names outside every configured zone.

use async_trait::async_trait;
use hickory_proto::rr::Name;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

use crate::error::ResolveError;

/// Upstream resolver consulted when no zone claims a name.
///
/// Called concurrently from every in-flight query.
#[async_trait]
pub trait DelegateResolver: Send + Sync {
    /// Addresses (IPv4 and IPv6) for `name`.
    async fn lookup_addresses(&self, name: &Name) -> Result<Vec<IpAddr>, ResolveError>;

    /// Name server hosts for `name`.
    async fn lookup_name_servers(&self, name: &Name) -> Result<Vec<Name>, ResolveError>;
}

/// Delegate backed by hickory's stub resolver.
pub struct SystemResolver {
    resolver: Resolver<TokioConnectionProvider>,
}

impl SystemResolver {
    /// Resolve through `upstream`, or through the system configuration
    /// (`/etc/resolv.conf` and friends) when `upstream` is empty.
    pub fn new(upstream: &[SocketAddr]) -> Result<Self, ResolveError> {
        let resolver = if upstream.is_empty() {
            info!("delegating to system resolver configuration");
            Resolver::builder_tokio()
                .map_err(|e| ResolveError::new("system configuration", e))?
                .build()
        } else {
            let mut group = NameServerConfigGroup::new();
            for addr in upstream {
                group.merge(NameServerConfigGroup::from_ips_clear(
                    &[addr.ip()],
                    addr.port(),
                    true,
                ));
            }
            info!(upstream = ?upstream, "delegating to configured upstream servers");
            Resolver::builder_with_config(
                ResolverConfig::from_parts(None, vec![], group),
                TokioConnectionProvider::default(),
            )
            .build()
        };

        Ok(Self { resolver })
    }
}

#[async_trait]
impl DelegateResolver for SystemResolver {
    async fn lookup_addresses(&self, name: &Name) -> Result<Vec<IpAddr>, ResolveError> {
        let lookup = self
            .resolver
            .lookup_ip(name.clone())
            .await
            .map_err(|e| ResolveError::new(name.to_string(), e))?;
        Ok(lookup.iter().collect())
    }

    async fn lookup_name_servers(&self, name: &Name) -> Result<Vec<Name>, ResolveError> {
        let lookup = self
            .resolver
            .ns_lookup(name.clone())
            .await
            .map_err(|e| ResolveError::new(name.to_string(), e))?;
        Ok(lookup.iter().map(|ns| ns.0.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_upstream() {
        let upstream: Vec<SocketAddr> = vec!["1.1.1.1:53".parse().unwrap(), "[2606:4700::1111]:5353".parse().unwrap()];
        assert!(SystemResolver::new(&upstream).is_ok());
    }
}
