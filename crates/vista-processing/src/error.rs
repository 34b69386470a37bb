//! Error types for the analytics pipeline.
//!
//! [`PipelineError`] splits into two families:
//!
//! - **Fatal**: [`DataRead`](PipelineError::DataRead),
//!   [`Validation`](PipelineError::Validation) (strict mode only), and the
//!   infrastructure wrappers. These abort the run and move it to `Failed`.
//! - **Recoverable**: [`Transformation`](PipelineError::Transformation),
//!   [`Analysis`](PipelineError::Analysis) and
//!   [`Dashboard`](PipelineError::Dashboard). The orchestrator records them
//!   as structured findings and keeps going.
//!
//! Errors serialize as `{code, message}` so they can be embedded in the run
//! summary.

use crate::pipeline::PipelineStage;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the analytics pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input could not be read: missing file, undecodable bytes, no rows.
    #[error("Failed to read data: {0}")]
    DataRead(String),

    /// Strict validation found an error-severity issue.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// One column's cleaning step failed.
    #[error("Failed to transform column '{column}': {reason}")]
    Transformation { column: String, reason: String },

    /// One analysis section failed.
    #[error("Analysis section '{section}' failed: {reason}")]
    Analysis { section: String, reason: String },

    /// One dashboard chart could not be rendered.
    #[error("Failed to render chart '{chart}': {reason}")]
    Dashboard { chart: String, reason: String },

    /// Pipeline was cancelled by the caller.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (e.g., thread join failure).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// AutoML engine error.
    #[error("Model training error: {0}")]
    Learning(#[from] vista_learning::LearningError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },

    /// A fatal error tagged with the stage it happened in.
    #[error("[{}] {source}", .stage.display_name())]
    AtStage {
        stage: PipelineStage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Tag an error with the stage it surfaced in. Already-tagged errors keep
    /// their original stage.
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        match self {
            tagged @ PipelineError::AtStage { .. } => tagged,
            other => PipelineError::AtStage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage recorded by [`at_stage`](Self::at_stage), if any.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::AtStage { stage, .. } => Some(*stage),
            Self::WithContext { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// Stable error code for machine consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DataRead(_) => "DATA_READ_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Transformation { .. } => "TRANSFORMATION_ERROR",
            Self::Analysis { .. } => "ANALYSIS_ERROR",
            Self::Dashboard { .. } => "DASHBOARD_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Csv(_) => "CSV_ERROR",
            Self::Learning(_) => "LEARNING_ERROR",
            Self::WithContext { source, .. } | Self::AtStage { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Learning(e) => e.is_cancelled(),
            Self::WithContext { source, .. } | Self::AtStage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Errors the orchestrator records and continues past.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transformation { .. } | Self::Analysis { .. } | Self::Dashboard { .. } => true,
            Self::WithContext { source, .. } | Self::AtStage { source, .. } => {
                source.is_recoverable()
            }
            _ => false,
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(PipelineError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            PipelineError::DataRead("empty file".to_string()).error_code(),
            "DATA_READ_ERROR"
        );
        assert_eq!(
            PipelineError::Validation("null rate".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_is_recoverable() {
        assert!(
            PipelineError::Analysis {
                section: "patterns".to_string(),
                reason: "x".to_string()
            }
            .is_recoverable()
        );
        assert!(
            PipelineError::Dashboard {
                chart: "c1".to_string(),
                reason: "x".to_string()
            }
            .is_recoverable()
        );
        assert!(!PipelineError::DataRead("x".to_string()).is_recoverable());
        assert!(!PipelineError::Validation("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_at_stage_keeps_first_stage() {
        let error = PipelineError::Validation("too many nulls".to_string())
            .at_stage(PipelineStage::Validate)
            .at_stage(PipelineStage::Finalize);
        assert_eq!(error.stage(), Some(PipelineStage::Validate));
        assert_eq!(error.error_code(), "VALIDATION_ERROR");
        assert!(error.to_string().contains("too many nulls"));
    }

    #[test]
    fn test_learning_cancellation_is_cancellation() {
        let error = PipelineError::from(vista_learning::LearningError::Cancelled);
        assert!(error.is_cancelled());
    }

    #[test]
    fn test_error_serialization() {
        let error = PipelineError::ColumnNotFound("revenue".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("revenue"));
    }

    #[test]
    fn test_with_context() {
        let error = PipelineError::ColumnNotFound("test".to_string()).with_context("During load");
        assert!(error.to_string().contains("During load"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
