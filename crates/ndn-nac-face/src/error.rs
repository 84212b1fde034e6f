//! Error types for faces.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why the network refused an Interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NackReason {
    NoRoute,
    Congestion,
    Duplicate,
    Other,
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoRoute => "NoRoute",
            Self::Congestion => "Congestion",
            Self::Duplicate => "Duplicate",
            Self::Other => "Other",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while expressing Interests or registering prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaceError {
    /// No Data arrived within the Interest lifetime.
    #[error("interest timed out")]
    Timeout,

    /// The network explicitly rejected the Interest.
    #[error("network nack: {0}")]
    Nack(NackReason),

    #[error("face is closed")]
    Closed,

    #[error("prefix registration failed: {0}")]
    Registration(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for face operations.
pub type Result<T> = std::result::Result<T, FaceError>;
