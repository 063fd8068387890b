//! Error types for vpnkit-bridge.

use std::io;

use thiserror::Error;

/// Failure on the framed stream or the local interface.
///
/// Always fatal to the pump direction that hit it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The stream ended before both length bytes arrived.
    #[error("short read on frame length: got {read} of 2 bytes")]
    ShortLengthRead {
        /// Bytes of the length field received before the stream ended.
        read: usize,
    },

    /// The stream ended before the declared payload was complete.
    #[error("short read on frame payload: got {read} of {expected} bytes")]
    ShortPayloadRead {
        /// Bytes of payload received before the stream ended.
        read: usize,
        /// Payload length declared by the length field.
        expected: usize,
    },

    /// A frame does not fit the wire format or the interface MTU.
    #[error("frame of {len} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Size of the offending frame.
        len: usize,
        /// Largest size accepted at this point.
        limit: usize,
    },

    /// Underlying read or write failed.
    #[error("cannot {op}: {source}")]
    Io {
        /// Operation that failed, e.g. "read from interface".
        op: &'static str,
        /// The I/O error.
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Wrap an I/O error with the operation it interrupted.
    pub fn io(op: &'static str, source: io::Error) -> Self {
        Self::Io { op, source }
    }
}

/// Delegate lookup failure. Always contained to the query that caused it.
#[derive(Debug, Error)]
#[error("lookup of {name} failed: {message}")]
pub struct ResolveError {
    /// Name that was looked up.
    pub name: String,
    /// Description from the upstream resolver.
    pub message: String,
}

impl ResolveError {
    /// Create a resolve error for `name`.
    pub fn new(name: impl Into<String>, message: impl ToString) -> Self {
        Self {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Malformed configuration, reported before anything is served.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A zone has an empty name.
    #[error("zone #{index} has an empty name")]
    EmptyZoneName {
        /// Position of the zone in the configuration.
        index: usize,
    },

    /// Two zones share a name.
    #[error("zone {0} is defined more than once")]
    DuplicateZone(String),

    /// A record sets neither or both of `name` and `regexp`.
    #[error("record #{index} in zone {zone} must set exactly one of `name` or `regexp`")]
    AmbiguousRecord {
        /// Zone holding the record.
        zone: String,
        /// Position of the record in the zone.
        index: usize,
    },

    /// A record pattern does not compile.
    #[error("invalid pattern in zone {zone}: {source}")]
    InvalidPattern {
        /// Zone holding the record.
        zone: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },

    /// Any other invalid value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for running the bridge or the DNS server.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error (network, device, process).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Bridge transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Resolver setup failure.
    #[error("resolver error: {0}")]
    Resolve(#[from] ResolveError),
}
