use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const EPISODE_PREFIX: &str = "ep_";

/// Identifier of a playable asset and the storage namespace of its renditions.
///
/// Content ids are bare (`42`), episode ids carry the `ep_` prefix (`ep_17`).
/// Only positive integers are accepted, so the textual form is always a safe
/// single path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKey {
    Content(i64),
    Episode(i64),
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid content identifier '{0}'")]
pub struct MediaKeyError(pub String);

impl MediaKey {
    /// Object-store prefix for this asset, with trailing slash.
    pub fn storage_prefix(&self) -> String {
        format!("videos/{}/", self)
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKey::Content(id) => write!(f, "{}", id),
            MediaKey::Episode(id) => write!(f, "{}{}", EPISODE_PREFIX, id),
        }
    }
}

impl FromStr for MediaKey {
    type Err = MediaKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (digits, episode) = match raw.strip_prefix(EPISODE_PREFIX) {
            Some(rest) => (rest, true),
            None => (raw, false),
        };

        // `parse` alone would accept a leading '+'.
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MediaKeyError(s.to_string()));
        }
        let id: i64 = digits.parse().map_err(|_| MediaKeyError(s.to_string()))?;
        if id <= 0 {
            return Err(MediaKeyError(s.to_string()));
        }

        Ok(if episode { MediaKey::Episode(id) } else { MediaKey::Content(id) })
    }
}

impl Serialize for MediaKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MediaKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
