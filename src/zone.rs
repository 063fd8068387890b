//! Authoritative local zones and the rules for matching names against them.
//!
//! ```text
//! zones = [a.internal., internal.]
//!
//! host.a.internal.  → zone a.internal., label "host"  (internal. never consulted)
//! db.internal.      → zone internal.,   label "db"
//! example.com.      → no zone, delegated upstream
//! ```

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::config::{RecordConfig, ZoneConfig};
use crate::error::ConfigError;

/// How a record selects names.
#[derive(Debug, Clone)]
pub enum RecordMatcher {
    /// The label equals this string.
    Exact(String),
    /// The pattern matches somewhere in the label.
    Pattern(Regex),
}

impl RecordMatcher {
    /// Whether `label` is selected.
    pub fn matches(&self, label: &str) -> bool {
        match self {
            RecordMatcher::Exact(name) => name == label,
            RecordMatcher::Pattern(re) => re.is_match(label),
        }
    }
}

/// A static address for names selected by a matcher.
#[derive(Debug, Clone)]
pub struct ZoneRecord {
    /// Selects the names this record answers.
    pub matcher: RecordMatcher,
    /// Address returned.
    pub ip: Ipv4Addr,
}

/// An authoritative namespace.
#[derive(Debug, Clone)]
pub struct Zone {
    name: String,
    suffix: String,
    records: Vec<ZoneRecord>,
    default_ip: Option<Ipv4Addr>,
}

/// Outcome of matching a name against the zone list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// A record in the matching zone selected the name.
    RecordHit(Ipv4Addr),
    /// No record matched; the zone's default address applies.
    DefaultHit(Ipv4Addr),
    /// The name falls in a zone but does not exist there.
    NameError,
    /// The name is outside every zone.
    NoZoneMatch,
}

impl Zone {
    /// Create an empty zone. `name` is lowercased and given a trailing dot.
    pub fn new(name: &str, default_ip: Option<Ipv4Addr>) -> Self {
        let mut name = name.to_ascii_lowercase();
        if !name.ends_with('.') {
            name.push('.');
        }
        let suffix = format!(".{}", name);

        Self {
            name,
            suffix,
            records: Vec::new(),
            default_ip,
        }
    }

    /// Append a record; records are tried in insertion order.
    pub fn with_record(mut self, matcher: RecordMatcher, ip: Ipv4Addr) -> Self {
        let matcher = match matcher {
            RecordMatcher::Exact(name) => RecordMatcher::Exact(name.to_ascii_lowercase()),
            pattern => pattern,
        };
        self.records.push(ZoneRecord { matcher, ip });
        self
    }

    /// Build a zone from its configuration.
    pub fn from_config(config: &ZoneConfig, index: usize) -> Result<Self, ConfigError> {
        if config.name.trim_end_matches('.').is_empty() {
            return Err(ConfigError::EmptyZoneName { index });
        }

        let mut zone = Zone::new(&config.name, config.default_ip);
        for (index, record) in config.records.iter().enumerate() {
            let matcher = match record {
                RecordConfig {
                    name: Some(name),
                    regexp: None,
                    ..
                } => RecordMatcher::Exact(name.clone()),
                RecordConfig {
                    name: None,
                    regexp: Some(pattern),
                    ..
                } => RecordMatcher::Pattern(
                    // Labels arrive lowercased, so patterns ignore case too.
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|source| ConfigError::InvalidPattern {
                            zone: zone.name.clone(),
                            source,
                        })?,
                ),
                _ => {
                    return Err(ConfigError::AmbiguousRecord {
                        zone: zone.name.clone(),
                        index,
                    })
                }
            };
            zone = zone.with_record(matcher, record.ip);
        }

        Ok(zone)
    }

    /// Normalized zone name, e.g. "internal.".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Catch-all address, if any.
    pub fn default_ip(&self) -> Option<Ipv4Addr> {
        self.default_ip
    }

    /// Records in match order.
    pub fn records(&self) -> &[ZoneRecord] {
        &self.records
    }

    /// The part of `name` below this zone, if `name` is inside it.
    ///
    /// The zone itself is not inside the zone: only proper subdomains match.
    pub fn local_label<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_suffix(self.suffix.as_str())
    }

    /// Answer a label already known to be inside this zone.
    pub fn resolve(&self, label: &str) -> MatchResult {
        if let Some(record) = self.records.iter().find(|r| r.matcher.matches(label)) {
            return MatchResult::RecordHit(record.ip);
        }
        match self.default_ip {
            Some(ip) => MatchResult::DefaultHit(ip),
            None => MatchResult::NameError,
        }
    }
}

/// Compile zone configurations, rejecting duplicates and bad records.
pub fn compile_zones(configs: &[ZoneConfig]) -> Result<Vec<Zone>, ConfigError> {
    let mut seen = HashSet::new();
    let mut zones = Vec::with_capacity(configs.len());

    for (index, config) in configs.iter().enumerate() {
        let zone = Zone::from_config(config, index)?;
        if !seen.insert(zone.name.clone()) {
            return Err(ConfigError::DuplicateZone(zone.name));
        }
        zones.push(zone);
    }

    Ok(zones)
}

/// Match a fully-qualified, lowercase `name` against `zones` in order.
///
/// Only the first zone containing the name is consulted, even when it has no
/// answer for it.
pub fn match_zones(zones: &[Zone], name: &str) -> MatchResult {
    zones
        .iter()
        .find_map(|zone| zone.local_label(name).map(|label| zone.resolve(label)))
        .unwrap_or(MatchResult::NoZoneMatch)
}
