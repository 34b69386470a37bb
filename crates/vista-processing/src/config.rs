//! Configuration types for the analytics pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup. Every field has a default, and
//! JSON config files may specify any subset of fields.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vista_learning::AutoMlConfig;

/// Strategy for imputing missing numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NumericImputation {
    /// Use the mean of non-null values
    Mean,
    /// Use the median of non-null values
    #[default]
    Median,
    /// Use a constant value (0.0)
    Zero,
}

/// Strategy for imputing missing categorical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CategoricalImputation {
    /// Use the most frequent value (mode)
    #[default]
    Mode,
    /// Use the sentinel category `"missing"`
    Missing,
}

/// Fill strategy for datetime columns. Datetimes are left null unless a
/// fill is asked for explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DatetimeFill {
    #[default]
    Leave,
    /// Carry the previous non-null value forward
    Forward,
    /// Carry the next non-null value backward
    Backward,
}

/// Outlier detection rule used by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutlierMethod {
    /// Outside `[Q1 - k*IQR, Q3 + k*IQR]`
    #[default]
    Iqr,
    /// `|z|` above the configured threshold
    ZScore,
}

/// Correlation coefficient computed by the statistics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
            Self::Kendall => "kendall",
        }
    }
}

/// Dashboard color theme. Rendering only; never affects data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Files written to the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    /// `dashboard.html`
    Html,
    /// `insights_report.md`
    Markdown,
    /// `run_summary.json`
    Json,
    /// `cleaned_data.csv`
    Csv,
}

impl ExportFormat {
    /// Default export set: everything except the cleaned dataset.
    pub fn defaults() -> Vec<ExportFormat> {
        vec![ExportFormat::Html, ExportFormat::Markdown, ExportFormat::Json]
    }
}

/// Validator thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// Null rate above which a column gets a warning.
    /// Default: 0.5
    pub max_null_rate: f64,

    /// Null rate above which a column gets an error.
    /// Default: 0.95
    pub null_rate_ceiling: f64,

    /// Default: Iqr
    pub outlier_method: OutlierMethod,

    /// Fence multiplier for [`OutlierMethod::Iqr`].
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Threshold for [`OutlierMethod::ZScore`].
    /// Default: 3.0
    pub zscore_threshold: f64,

    /// Default: true
    pub check_duplicates: bool,

    /// Duplicate share above which duplicates become an error.
    /// Default: 0.5
    pub max_duplicate_rate: f64,

    /// Coercion-loss share above which a type mismatch suggests reviewing
    /// the source rather than imputing.
    /// Default: 0.05
    pub max_type_mismatch_rate: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            max_null_rate: 0.5,
            null_rate_ceiling: 0.95,
            outlier_method: OutlierMethod::Iqr,
            iqr_multiplier: 1.5,
            zscore_threshold: 3.0,
            check_duplicates: true,
            max_duplicate_rate: 0.5,
            max_type_mismatch_rate: 0.05,
        }
    }
}

/// Configuration for the analytics pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use vista_processing::config::{PipelineConfig, Theme};
///
/// let config = PipelineConfig::builder()
///     .target_column("revenue")
///     .time_column("date")
///     .theme(Theme::Dark)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column to predict. No target means AutoML is skipped.
    pub target_column: Option<String>,

    /// Column holding timestamps for trend detection and time-series charts.
    pub time_column: Option<String>,

    /// Free text describing the business; columns it mentions are ranked
    /// first within an insight priority tier.
    pub business_context: Option<String>,

    /// Cap on rows read from the input.
    /// Default: None (read everything)
    pub sample_size: Option<usize>,

    /// Rows per streamed read chunk.
    /// Default: 10000
    pub chunk_size: usize,

    pub validation: ValidationThresholds,

    /// Abort on error-severity validation findings.
    /// Default: false
    pub strict_validation: bool,

    /// Default: Median
    pub numeric_imputation: NumericImputation,

    /// Default: Mode
    pub categorical_imputation: CategoricalImputation,

    /// Default: Leave
    pub datetime_fill: DatetimeFill,

    /// Cap flagged outliers at the fences.
    /// Default: true
    pub cap_outliers: bool,

    /// Remove exact duplicate rows.
    /// Default: false
    pub remove_duplicates: bool,

    /// A string column is categorical when its distinct count is at most
    /// this share of its non-null values, otherwise free text.
    /// Default: 0.5
    pub categorical_cardinality_ratio: f64,

    /// Largest k tried by the elbow search.
    /// Default: 10
    pub max_clusters: usize,

    /// Share of rows flagged as anomalies.
    /// Default: 0.05
    pub contamination: f64,

    /// Default: Pearson
    pub correlation_method: CorrelationMethod,

    /// Rows embedded in the dashboard.
    /// Default: 500
    pub dashboard_sample_rows: usize,

    /// Default: Light
    pub theme: Theme,

    /// Embed the dashboard payload as gzip + base64.
    /// Default: false
    pub compress_payload: bool,

    /// Default: html, markdown, json
    pub export_formats: Vec<ExportFormat>,

    /// Output directory for the run bundle.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Whether to write the output bundle. When false, results stay in
    /// memory only.
    /// Default: true
    pub save_to_disk: bool,

    /// Seed for sampling, clustering, isolation forest and model splits.
    /// Default: 42
    pub random_seed: u64,

    /// Use the ensemble model backend when it is compiled in.
    /// Default: true
    pub prefer_advanced_model: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_column: None,
            time_column: None,
            business_context: None,
            sample_size: None,
            chunk_size: 10_000,
            validation: ValidationThresholds::default(),
            strict_validation: false,
            numeric_imputation: NumericImputation::default(),
            categorical_imputation: CategoricalImputation::default(),
            datetime_fill: DatetimeFill::default(),
            cap_outliers: true,
            remove_duplicates: false,
            categorical_cardinality_ratio: 0.5,
            max_clusters: 10,
            contamination: 0.05,
            correlation_method: CorrelationMethod::default(),
            dashboard_sample_rows: 500,
            theme: Theme::default(),
            compress_payload: false,
            export_formats: ExportFormat::defaults(),
            output_dir: PathBuf::from("output"),
            save_to_disk: true,
            random_seed: 42,
            prefer_advanced_model: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a (possibly partial) JSON configuration file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        let v = &self.validation;
        for (field, value) in [
            ("validation.max_null_rate", v.max_null_rate),
            ("validation.null_rate_ceiling", v.null_rate_ceiling),
            ("validation.max_duplicate_rate", v.max_duplicate_rate),
            ("validation.max_type_mismatch_rate", v.max_type_mismatch_rate),
            ("categorical_cardinality_ratio", self.categorical_cardinality_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if v.null_rate_ceiling < v.max_null_rate {
            return Err(ConfigValidationError::InvalidValue {
                field: "validation.null_rate_ceiling".to_string(),
                reason: "must not be below max_null_rate".to_string(),
            });
        }

        if v.iqr_multiplier <= 0.0 || v.zscore_threshold <= 0.0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "validation".to_string(),
                reason: "outlier thresholds must be positive".to_string(),
            });
        }

        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigValidationError::InvalidValue {
                field: "contamination".to_string(),
                reason: format!("{} is outside (0.0, 0.5]", self.contamination),
            });
        }

        for (field, value, min) in [
            ("chunk_size", self.chunk_size, 1),
            ("max_clusters", self.max_clusters, 2),
            ("dashboard_sample_rows", self.dashboard_sample_rows, 1),
            ("sample_size", self.sample_size.unwrap_or(1), 1),
        ] {
            if value < min {
                return Err(ConfigValidationError::InvalidCount {
                    field: field.to_string(),
                    value,
                    min,
                });
            }
        }

        Ok(())
    }

    /// Settings handed to the AutoML engine.
    pub fn automl_config(&self) -> AutoMlConfig {
        AutoMlConfig {
            random_seed: self.random_seed,
            prefer_advanced: self.prefer_advanced_model,
            ..AutoMlConfig::default()
        }
    }

    /// Whether `format` is in the export list.
    pub fn exports(&self, format: ExportFormat) -> bool {
        self.export_formats.contains(&format)
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid value for '{field}': {value} (must be at least {min})")]
    InvalidCount {
        field: String,
        value: usize,
        min: usize,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    target_column: Option<String>,
    time_column: Option<String>,
    business_context: Option<String>,
    sample_size: Option<usize>,
    chunk_size: Option<usize>,
    validation: Option<ValidationThresholds>,
    strict_validation: Option<bool>,
    numeric_imputation: Option<NumericImputation>,
    categorical_imputation: Option<CategoricalImputation>,
    datetime_fill: Option<DatetimeFill>,
    cap_outliers: Option<bool>,
    remove_duplicates: Option<bool>,
    categorical_cardinality_ratio: Option<f64>,
    max_clusters: Option<usize>,
    contamination: Option<f64>,
    correlation_method: Option<CorrelationMethod>,
    dashboard_sample_rows: Option<usize>,
    theme: Option<Theme>,
    compress_payload: Option<bool>,
    export_formats: Option<Vec<ExportFormat>>,
    output_dir: Option<PathBuf>,
    save_to_disk: Option<bool>,
    random_seed: Option<u64>,
    prefer_advanced_model: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the target column for AutoML.
    pub fn target_column(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Set the time column used for trends and time-series charts.
    pub fn time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = Some(column.into());
        self
    }

    pub fn business_context(mut self, context: impl Into<String>) -> Self {
        self.business_context = Some(context.into());
        self
    }

    /// Cap the number of rows read from the input.
    pub fn sample_size(mut self, rows: usize) -> Self {
        self.sample_size = Some(rows);
        self
    }

    pub fn chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    pub fn validation(mut self, thresholds: ValidationThresholds) -> Self {
        self.validation = Some(thresholds);
        self
    }

    /// Abort the run on error-severity validation findings.
    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = Some(strict);
        self
    }

    pub fn numeric_imputation(mut self, strategy: NumericImputation) -> Self {
        self.numeric_imputation = Some(strategy);
        self
    }

    pub fn categorical_imputation(mut self, strategy: CategoricalImputation) -> Self {
        self.categorical_imputation = Some(strategy);
        self
    }

    pub fn datetime_fill(mut self, strategy: DatetimeFill) -> Self {
        self.datetime_fill = Some(strategy);
        self
    }

    /// Enable or disable capping outliers at the fences.
    pub fn cap_outliers(mut self, cap: bool) -> Self {
        self.cap_outliers = Some(cap);
        self
    }

    /// Enable or disable duplicate row removal.
    pub fn remove_duplicates(mut self, remove: bool) -> Self {
        self.remove_duplicates = Some(remove);
        self
    }

    pub fn categorical_cardinality_ratio(mut self, ratio: f64) -> Self {
        self.categorical_cardinality_ratio = Some(ratio);
        self
    }

    pub fn max_clusters(mut self, k: usize) -> Self {
        self.max_clusters = Some(k);
        self
    }

    /// Set the anomaly contamination rate.
    pub fn contamination(mut self, rate: f64) -> Self {
        self.contamination = Some(rate);
        self
    }

    pub fn correlation_method(mut self, method: CorrelationMethod) -> Self {
        self.correlation_method = Some(method);
        self
    }

    pub fn dashboard_sample_rows(mut self, rows: usize) -> Self {
        self.dashboard_sample_rows = Some(rows);
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn compress_payload(mut self, compress: bool) -> Self {
        self.compress_payload = Some(compress);
        self
    }

    pub fn export_formats(mut self, formats: Vec<ExportFormat>) -> Self {
        self.export_formats = Some(formats);
        self
    }

    /// Set the output directory for the run bundle.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Enable or disable writing the output bundle.
    ///
    /// When false, the pipeline keeps results in memory only and skips
    /// all file I/O.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Prefer the ensemble model backend over the linear baseline.
    pub fn prefer_advanced_model(mut self, prefer: bool) -> Self {
        self.prefer_advanced_model = Some(prefer);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            target_column: self.target_column,
            time_column: self.time_column,
            business_context: self.business_context,
            sample_size: self.sample_size,
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            validation: self.validation.unwrap_or_default(),
            strict_validation: self.strict_validation.unwrap_or(false),
            numeric_imputation: self.numeric_imputation.unwrap_or_default(),
            categorical_imputation: self.categorical_imputation.unwrap_or_default(),
            datetime_fill: self.datetime_fill.unwrap_or_default(),
            cap_outliers: self.cap_outliers.unwrap_or(true),
            remove_duplicates: self.remove_duplicates.unwrap_or(false),
            categorical_cardinality_ratio: self
                .categorical_cardinality_ratio
                .unwrap_or(defaults.categorical_cardinality_ratio),
            max_clusters: self.max_clusters.unwrap_or(defaults.max_clusters),
            contamination: self.contamination.unwrap_or(defaults.contamination),
            correlation_method: self.correlation_method.unwrap_or_default(),
            dashboard_sample_rows: self
                .dashboard_sample_rows
                .unwrap_or(defaults.dashboard_sample_rows),
            theme: self.theme.unwrap_or_default(),
            compress_payload: self.compress_payload.unwrap_or(false),
            export_formats: self.export_formats.unwrap_or(defaults.export_formats),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            save_to_disk: self.save_to_disk.unwrap_or(true),
            random_seed: self.random_seed.unwrap_or(defaults.random_seed),
            prefer_advanced_model: self.prefer_advanced_model.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.validation.max_null_rate, 0.5);
        assert_eq!(config.validation.null_rate_ceiling, 0.95);
        assert_eq!(config.validation.outlier_method, OutlierMethod::Iqr);
        assert_eq!(config.chunk_size, 10_000);
        assert!(config.cap_outliers);
        assert!(!config.remove_duplicates);
        assert!(!config.strict_validation);
        assert_eq!(config.export_formats, ExportFormat::defaults());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .target_column("revenue")
            .time_column("date")
            .strict_validation(true)
            .correlation_method(CorrelationMethod::Spearman)
            .theme(Theme::Dark)
            .build()
            .unwrap();

        assert_eq!(config.target_column.as_deref(), Some("revenue"));
        assert_eq!(config.time_column.as_deref(), Some("date"));
        assert!(config.strict_validation);
        assert_eq!(config.correlation_method, CorrelationMethod::Spearman);
        assert_eq!(config.theme, Theme::Dark);
    }

    #[test]
    fn test_validation_invalid_threshold() {
        let thresholds = ValidationThresholds {
            max_null_rate: 1.5,
            ..ValidationThresholds::default()
        };
        let result = PipelineConfig::builder().validation(thresholds).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold { .. }
        ));
    }

    #[test]
    fn test_validation_ceiling_below_warning_rate() {
        let thresholds = ValidationThresholds {
            max_null_rate: 0.8,
            null_rate_ceiling: 0.6,
            ..ValidationThresholds::default()
        };
        let result = PipelineConfig::builder().validation(thresholds).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_validation_invalid_counts() {
        assert!(matches!(
            PipelineConfig::builder().max_clusters(1).build().unwrap_err(),
            ConfigValidationError::InvalidCount { .. }
        ));
        assert!(PipelineConfig::builder().sample_size(0).build().is_err());
        assert!(PipelineConfig::builder().contamination(0.0).build().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "target_column": "revenue",
            "strict_validation": true,
            "validation": { "max_null_rate": 0.3 },
            "export_formats": ["Html", "Csv"],
            "theme": "Dark"
        }"#;

        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.target_column, Some("revenue".to_string()));
        assert!(config.strict_validation);
        assert_eq!(config.validation.max_null_rate, 0.3);
        assert_eq!(config.validation.null_rate_ceiling, 0.95);
        assert_eq!(config.export_formats, vec![ExportFormat::Html, ExportFormat::Csv]);
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.chunk_size, 10_000);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"time_column": "date", "max_clusters": 5}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.time_column.as_deref(), Some("date"));
        assert_eq!(config.max_clusters, 5);

        std::fs::write(&path, r#"{"max_clusters": 1}"#).unwrap();
        let err = PipelineConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_automl_config_carries_seed() {
        let config = PipelineConfig::builder()
            .random_seed(7)
            .prefer_advanced_model(false)
            .build()
            .unwrap();
        let automl = config.automl_config();
        assert_eq!(automl.random_seed, 7);
        assert!(!automl.prefer_advanced);
    }
}
