pub mod lru;

use std::fmt;

/// Result of a single cache access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    /// Miss that landed in an empty line.
    MissFill,
    /// Miss that displaced a valid line.
    MissEvict,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Hit => f.write_str("hit"),
            Outcome::MissFill => f.write_str("miss"),
            Outcome::MissEvict => f.write_str("miss eviction"),
        }
    }
}
