//! The four finding logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CanaryError;

/// Which log a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// The codec recognised no message shape for the line.
    Unhandled,
    /// Deserialization failed, either in the codec or in transport.
    Undeserializable,
    /// Deserialization succeeded but serialization failed.
    Unserializable,
    /// Both steps succeeded but the texts differ.
    Inequal,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Unhandled,
        Category::Undeserializable,
        Category::Unserializable,
        Category::Inequal,
    ];

    /// Wire name used by the HTTP `type` parameter and the metrics payload.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Unhandled => "unhandled",
            Category::Undeserializable => "undeserializable",
            Category::Unserializable => "unserializable",
            Category::Inequal => "inequal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CanaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| CanaryError::InvalidInput(format!("unknown log category: {s}")))
    }
}
