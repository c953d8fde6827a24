//! Version slot identifiers
//!
//! A generation request yields at most [`SLOT_COUNT`] alternative renderings.
//! Each rendering lives in a fixed slot (`v1` through `v4`). Slot order is the
//! declaration order below and drives every ordered traversal (ready-key
//! listing, skip navigation).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of version slots produced by one generation request
pub const SLOT_COUNT: usize = 4;

/// Identifier of one generated version slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionId {
    V1,
    V2,
    V3,
    V4,
}

impl VersionId {
    /// All slots in declaration order
    pub const ALL: [VersionId; SLOT_COUNT] = [
        VersionId::V1,
        VersionId::V2,
        VersionId::V3,
        VersionId::V4,
    ];

    /// Wire name (`"v1"` ... `"v4"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionId::V1 => "v1",
            VersionId::V2 => "v2",
            VersionId::V3 => "v3",
            VersionId::V4 => "v4",
        }
    }

    /// Position in declaration order
    pub fn index(&self) -> usize {
        match self {
            VersionId::V1 => 0,
            VersionId::V2 => 1,
            VersionId::V3 => 2,
            VersionId::V4 => 3,
        }
    }

    /// Slot at `index`, if in range
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Neighbouring slot in `direction`, wrapping around the ends
    pub fn step(&self, direction: Direction) -> Self {
        let i = self.index();
        let next = match direction {
            Direction::Next => (i + 1) % SLOT_COUNT,
            Direction::Previous => (i + SLOT_COUNT - 1) % SLOT_COUNT,
        };
        Self::ALL[next]
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(VersionId::V1),
            "v2" | "2" => Ok(VersionId::V2),
            "v3" | "3" => Ok(VersionId::V3),
            "v4" | "4" => Ok(VersionId::V4),
            other => Err(Error::InvalidInput(format!("unknown version slot: {:?}", other))),
        }
    }
}

/// Skip direction through the slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Previous,
    Next,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Previous => write!(f, "previous"),
            Direction::Next => write!(f, "next"),
        }
    }
}
