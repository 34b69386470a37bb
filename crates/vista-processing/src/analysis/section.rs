//! Outcome of one independently computed analysis section.

use serde::{Deserialize, Serialize};

/// Every section ends in exactly one of these states, so consumers can
/// always tell a skipped or failed section from an empty one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    Completed(T),
    /// Not attempted because its inputs were missing.
    Skipped { reason: String },
    /// Attempted and failed with a recoverable error.
    Failed { reason: String },
}

impl<T> SectionOutcome<T> {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// `"completed"`, `"skipped"` or `"failed"`.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    /// Reason for a skipped or failed section.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Skipped { reason } | Self::Failed { reason } => Some(reason),
        }
    }
}
