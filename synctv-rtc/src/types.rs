//! Common types used throughout the optimizer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied identifier of an optimized connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Media kind of an outbound sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Data,
}

impl From<&str> for MediaKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "audio" => Self::Audio,
            "video" => Self::Video,
            _ => Self::Data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::from("peer-1");
        assert_eq!(id.to_string(), "peer-1");
        assert_eq!(id, ConnectionId::new(String::from("peer-1")));
    }

    #[test]
    fn test_media_kind_from_str() {
        assert_eq!(MediaKind::from("Video"), MediaKind::Video);
        assert_eq!(MediaKind::from("audio"), MediaKind::Audio);
        assert_eq!(MediaKind::from("application"), MediaKind::Data);
    }
}
