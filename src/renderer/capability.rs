//! Renderer capability profiles built from DLNA protocolInfo strings.
//!
//! A renderer describes what it plays as a comma-separated list of
//! `protocol:network:mime:extra` tuples (the `Sink` side of ConnectionManager
//! `GetProtocolInfo`, or a configured string). [`CapabilityProfile`] keeps the
//! parsed tuple set together with the indexes derived from it, and guarantees the
//! two are never observed out of sync.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("expected 4 ':'-separated fields, found {0}")]
    FieldCount(usize),
    #[error("empty {0} field")]
    EmptyField(&'static str),
}

/// One `protocol:network:mime:extra` tuple. `*` is a wildcard in any field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolInfo {
    pub protocol: String,
    pub network: String,
    /// Stored lowercased; MIME comparison is case-insensitive.
    pub mime: String,
    pub extra: String,
}

impl ProtocolInfo {
    /// Value of a `;`-separated `KEY=value` parameter in the extra field,
    /// e.g. `DLNA.ORG_PN`.
    pub fn extra_param(&self, key: &str) -> Option<&str> {
        self.extra
            .split(';')
            .filter_map(|kv| kv.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| v.trim())
    }

    pub fn accepts_mime(&self, mime: &str) -> bool {
        self.mime == "*" || self.mime.eq_ignore_ascii_case(mime)
    }
}

impl FromStr for ProtocolInfo {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().splitn(4, ':').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(CapabilityError::FieldCount(fields.len()));
        }
        for (name, value) in ["protocol", "network", "mime"].iter().zip(&fields) {
            if value.is_empty() {
                return Err(CapabilityError::EmptyField(name));
            }
        }
        Ok(ProtocolInfo {
            protocol: fields[0].to_string(),
            network: fields[1].to_string(),
            mime: fields[2].to_ascii_lowercase(),
            extra: if fields[3].is_empty() { "*".to_string() } else { fields[3].to_string() },
        })
    }
}

impl fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.protocol, self.network, self.mime, self.extra)
    }
}

/// Tuple set plus derived indexes. Only ever touched under the profile's lock.
#[derive(Debug, Default)]
struct Sets {
    tuples: HashSet<ProtocolInfo>,
    image_profiles: HashSet<String>,
    audio_mimes: HashSet<String>,
    video_mimes: HashSet<String>,
}

impl Sets {
    fn reindex(&mut self) {
        self.image_profiles.clear();
        self.audio_mimes.clear();
        self.video_mimes.clear();
        for info in &self.tuples {
            if info.mime.starts_with("image/") {
                if let Some(pn) = info.extra_param("DLNA.ORG_PN") {
                    self.image_profiles.insert(pn.to_ascii_uppercase());
                }
            } else if info.mime.starts_with("audio/") {
                self.audio_mimes.insert(info.mime.clone());
            } else if info.mime.starts_with("video/") {
                self.video_mimes.insert(info.mime.clone());
            }
        }
    }
}

/// Parse a comma-separated tuple list, logging and dropping malformed entries.
fn parse_tuples(capabilities: &str) -> Vec<ProtocolInfo> {
    capabilities
        .split(',')
        .filter(|e| !e.trim().is_empty())
        .filter_map(|element| match element.parse::<ProtocolInfo>() {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!("Unable to parse protocolInfo \"{}\" ({}), skipping it", element.trim(), e);
                None
            }
        })
        .collect()
}

/// The set of protocolInfo tuples a renderer accepts.
///
/// Every mutation recomputes the derived indexes while still holding the write
/// lock, so readers always see a tuple set with its matching indexes. Queries
/// return owned copies.
#[derive(Debug, Default)]
pub struct CapabilityProfile {
    sets: RwLock<Sets>,
}

impl CapabilityProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a profile from a comma-separated tuple string.
    pub fn parse(capabilities: &str) -> Self {
        let profile = Self::new();
        profile.add(capabilities);
        profile
    }

    fn read(&self) -> RwLockReadGuard<'_, Sets> {
        self.sets.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sets> {
        self.sets.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the tuple set with the tuples parsed from `capabilities`.
    pub fn set(&self, capabilities: &str) {
        let parsed = parse_tuples(capabilities);
        let mut sets = self.write();
        sets.tuples = parsed.into_iter().collect();
        sets.reindex();
    }

    /// Union the tuples parsed from `capabilities` into the set.
    /// Returns true if the set changed.
    pub fn add(&self, capabilities: &str) -> bool {
        let parsed = parse_tuples(capabilities);
        if parsed.is_empty() {
            return false;
        }
        let mut sets = self.write();
        let mut changed = false;
        for info in parsed {
            changed |= sets.tuples.insert(info);
        }
        if changed {
            sets.reindex();
        }
        changed
    }

    pub fn remove(&self, info: &ProtocolInfo) -> bool {
        let mut sets = self.write();
        let removed = sets.tuples.remove(info);
        if removed {
            sets.reindex();
        }
        removed
    }

    pub fn clear(&self) {
        let mut sets = self.write();
        sets.tuples.clear();
        sets.reindex();
    }

    pub fn supports(&self, info: &ProtocolInfo) -> bool {
        self.read().tuples.contains(info)
    }

    pub fn supports_all<'a>(&self, infos: impl IntoIterator<Item = &'a ProtocolInfo>) -> bool {
        let sets = self.read();
        infos.into_iter().all(|i| sets.tuples.contains(i))
    }

    /// Whether the renderer plays content of this MIME type. An empty profile
    /// describes a renderer we know nothing about and accepts everything.
    pub fn accepts_mime(&self, mime: &str) -> bool {
        let sets = self.read();
        sets.tuples.is_empty() || sets.tuples.iter().any(|t| t.accepts_mime(mime))
    }

    pub fn len(&self) -> usize {
        self.read().tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().tuples.is_empty()
    }

    /// Snapshot of the tuple set, sorted for stable output.
    pub fn to_vec(&self) -> Vec<ProtocolInfo> {
        let mut out: Vec<ProtocolInfo> = self.read().tuples.iter().cloned().collect();
        out.sort();
        out
    }

    pub fn image_profiles(&self) -> Vec<String> {
        let mut out: Vec<String> = self.read().image_profiles.iter().cloned().collect();
        out.sort();
        out
    }

    pub fn supports_image_profile(&self, profile: &str) -> bool {
        self.read().image_profiles.contains(&profile.to_ascii_uppercase())
    }

    pub fn audio_mimes(&self) -> Vec<String> {
        let mut out: Vec<String> = self.read().audio_mimes.iter().cloned().collect();
        out.sort();
        out
    }

    pub fn video_mimes(&self) -> Vec<String> {
        let mut out: Vec<String> = self.read().video_mimes.iter().cloned().collect();
        out.sort();
        out
    }
}

impl fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.to_vec().iter().map(ToString::to_string).collect();
        f.write_str(&joined.join(","))
    }
}
