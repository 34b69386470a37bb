//! Error types for the vista-learning crate.
//!
//! This module defines [`LearningError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, LearningError>`.
//!
//! # Error Handling
//!
//! Insufficient data is *not* an error at the engine level: [`AutoMl::run`]
//! reports it as [`AutoMlOutcome::Skipped`]. The variants below are reserved
//! for conditions a caller cannot anticipate from the shape of its data.
//!
//! [`AutoMl::run`]: crate::AutoMl::run
//! [`AutoMlOutcome::Skipped`]: crate::AutoMlOutcome::Skipped

use thiserror::Error;

/// The main error type for vista-learning operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// Invalid configuration provided to the engine.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data provided for training.
    ///
    /// Common causes:
    /// - No usable feature columns remain after encoding
    /// - The target column has a single distinct value
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The specified target column was not found in the DataFrame.
    ///
    /// Column names are case-sensitive.
    #[error("Target column '{0}' not found")]
    TargetNotFound(String),

    /// Fewer rows than the configured minimum.
    #[error("Insufficient data: {rows} usable rows, at least {required} required")]
    InsufficientData {
        /// Rows with a non-null target.
        rows: usize,
        /// Configured minimum.
        required: usize,
    },

    /// A backend failed while fitting.
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// Training was cancelled by the caller.
    #[error("Training cancelled")]
    Cancelled,

    /// Polars error while extracting features.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl LearningError {
    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for vista-learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;
