//! Version numbers of the phone and watch apps, e.g. "1.0.31".
//!
//! 0.255.255 is reserved: it stands for both "unknown" and "could not parse". The two
//! cases are indistinguishable, so a peer that really reports 0.255.255 reads as unknown.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A (major, minor, patch) triple. Ordering is major, then minor, then patch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    /// Sentinel for an unknown or unparseable version.
    pub const UNKNOWN: Version = Version::new(0, 255, 255);

    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this build. Falls back to [`Version::UNKNOWN`] if the package version
    /// is not a plain `major.minor.patch` (e.g. carries a pre-release suffix).
    pub fn current() -> Version {
        Version::parse(env!("CARGO_PKG_VERSION"))
    }

    /// Three-way comparison on (major, minor, patch).
    pub fn compare(a: Version, b: Version) -> Ordering {
        a.cmp(&b)
    }

    pub fn is_unknown(self) -> bool {
        self == Version::UNKNOWN
    }

    /// Parse `"major.minor.patch"`, each component a decimal number in 0..=255.
    /// Any malformed input yields [`Version::UNKNOWN`].
    pub fn parse(s: &str) -> Version {
        let mut parts = s.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Version::UNKNOWN;
        };
        match (component(major), component(minor), component(patch)) {
            (Some(major), Some(minor), Some(patch)) => Version::new(major, minor, patch),
            _ => Version::UNKNOWN,
        }
    }
}

fn component(s: &str) -> Option<u8> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

/// Rejects strings that only parse to the sentinel. Used where a version comes from
/// configuration rather than from the peer.
impl TryFrom<String> for Version {
    type Error = InvalidVersion;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let v = Version::parse(&s);
        if v.is_unknown() && s != Version::UNKNOWN.to_string() {
            return Err(InvalidVersion(s));
        }
        Ok(v)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid version string: {0:?}")]
pub struct InvalidVersion(pub String);
