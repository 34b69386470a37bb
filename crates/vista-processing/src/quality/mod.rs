//! Data quality validation.
//!
//! The [`Validator`] checks null rates, coercion losses, duplicate rows and
//! outliers against [`ValidationThresholds`](crate::config::ValidationThresholds)
//! and returns a [`ValidationReport`]. Strict mode turns error findings
//! into a failed run; that decision lives in the pipeline executor.

mod validator;

pub use validator::{
    IssueKind, OutlierFence, Severity, ValidationFinding, ValidationReport, Validator,
    count_duplicate_rows,
};
