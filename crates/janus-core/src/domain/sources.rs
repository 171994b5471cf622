//! Media sources exposed by the gateway's streaming plugin.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::session::HandleId;

/// Identifier of one remotely exposed stream (a camera, for instance).
///
/// Unique within one connection's discovery result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SourceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(SourceId)
    }
}

/// A discovered source and, once it has been captured from, the plugin
/// handle bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub name: String,
    /// Bound lazily on the first capture; reused afterwards.
    pub handle: Option<HandleId>,
}

impl SourceDescriptor {
    /// Builds a descriptor from one entry of the gateway's stream list.
    ///
    /// Streams published without a description are named `Camera <id>`.
    pub fn from_listing(id: SourceId, description: Option<&str>) -> Self {
        let name = match description {
            Some(text) => text.to_string(),
            None => default_source_name(id),
        };
        Self {
            id,
            name,
            handle: None,
        }
    }
}

/// Display name used for a stream the gateway did not describe.
pub fn default_source_name(id: SourceId) -> String {
    format!("Camera {id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_honours_width_and_alignment() {
        assert_eq!(format!("{:>4}", SourceId(7)), "   7");
        assert_eq!(format!("{:<3}|", SourceId(12)), "12 |");
    }

    #[test]
    fn test_listing_with_description_keeps_it() {
        let d = SourceDescriptor::from_listing(SourceId(1), Some("Bow"));
        assert_eq!(d.name, "Bow");
        assert!(d.handle.is_none());
    }

    #[test]
    fn test_listing_without_description_gets_camera_name() {
        let d = SourceDescriptor::from_listing(SourceId(7), None);
        assert_eq!(d.name, "Camera 7");
    }

    #[test]
    fn test_source_id_parses_with_whitespace() {
        assert_eq!(" 12 ".parse::<SourceId>().unwrap(), SourceId(12));
        assert!("twelve".parse::<SourceId>().is_err());
    }
}
