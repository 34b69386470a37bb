//! Configuration types for the AutoML engine.
//!
//! This module provides [`AutoMlConfig`] and its builder, as well as the
//! [`ProblemType`] enum.
//!
//! # Example
//!
//! ```
//! use vista_learning::{AutoMlConfig, ProblemType};
//!
//! let config = AutoMlConfig::builder()
//!     .problem_type(ProblemType::Regression)
//!     .test_size(0.25)
//!     .n_trees(100)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.n_trees, 100);
//! ```

use crate::error::LearningError;
use serde::{Deserialize, Serialize};

/// The type of machine learning problem to solve.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new problem types
/// in future versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ProblemType {
    /// Predicting discrete classes.
    Classification,
    /// Predicting continuous values.
    Regression,
}

impl ProblemType {
    /// Returns the lowercase name used in reports.
    ///
    /// ```
    /// use vista_learning::ProblemType;
    ///
    /// assert_eq!(ProblemType::Classification.as_str(), "classification");
    /// assert_eq!(ProblemType::Regression.as_str(), "regression");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Classification => "classification",
            ProblemType::Regression => "regression",
        }
    }
}

/// Configuration for the AutoML engine.
///
/// # Validation
///
/// [`build()`](AutoMlConfigBuilder::build) checks:
/// - `test_size` in `(0.0, 1.0)` exclusive
/// - `min_rows` at least 4 (both splits need rows)
/// - `n_trees`, `max_depth`, `permutation_repeats` at least 1
/// - `min_samples_split` at least 2
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMlConfig {
    /// Forces the problem type instead of detecting it from the target.
    pub problem_type: Option<ProblemType>,

    /// Fraction of rows held out for validation (default: 0.2).
    pub test_size: f64,

    /// Seed for the split, bootstrap samples and permutations (default: 42).
    pub random_seed: u64,

    /// Minimum rows with a non-null target (default: 20).
    ///
    /// Below this the engine skips training instead of failing.
    pub min_rows: usize,

    /// Numeric targets with at most this many distinct integer values are
    /// treated as class labels (default: 20).
    pub max_classes: usize,

    /// String feature columns above this cardinality are dropped instead of
    /// one-hot encoded (default: 20).
    pub max_one_hot_cardinality: usize,

    /// Prefer the ensemble backend when it is compiled in (default: true).
    pub prefer_advanced: bool,

    /// Trees in the random forest (default: 50).
    pub n_trees: usize,

    /// Maximum depth of each tree (default: 8).
    pub max_depth: usize,

    /// Minimum samples required to split a node (default: 4).
    pub min_samples_split: usize,

    /// Shuffles per feature for permutation importance (default: 3).
    pub permutation_repeats: usize,

    /// Rows beyond this are subsampled by stride before training (default: 100 000).
    pub max_rows: usize,
}

impl Default for AutoMlConfig {
    fn default() -> Self {
        Self {
            problem_type: None,
            test_size: 0.2,
            random_seed: 42,
            min_rows: 20,
            max_classes: 20,
            max_one_hot_cardinality: 20,
            prefer_advanced: true,
            n_trees: 50,
            max_depth: 8,
            min_samples_split: 4,
            permutation_repeats: 3,
            max_rows: 100_000,
        }
    }
}

impl AutoMlConfig {
    /// Create a new builder for `AutoMlConfig`.
    pub fn builder() -> AutoMlConfigBuilder {
        AutoMlConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), LearningError> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(LearningError::InvalidConfig(format!(
                "test_size must be between 0.0 and 1.0 (exclusive), got {}",
                self.test_size
            )));
        }
        if self.min_rows < 4 {
            return Err(LearningError::InvalidConfig(format!(
                "min_rows must be at least 4, got {}",
                self.min_rows
            )));
        }
        if self.max_rows < self.min_rows {
            return Err(LearningError::InvalidConfig(format!(
                "max_rows ({}) must not be below min_rows ({})",
                self.max_rows, self.min_rows
            )));
        }
        if self.n_trees == 0 || self.max_depth == 0 || self.permutation_repeats == 0 {
            return Err(LearningError::InvalidConfig(
                "n_trees, max_depth and permutation_repeats must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(LearningError::InvalidConfig(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        Ok(())
    }
}

/// Builder for [`AutoMlConfig`].
#[derive(Debug, Default)]
pub struct AutoMlConfigBuilder {
    problem_type: Option<ProblemType>,
    test_size: Option<f64>,
    random_seed: Option<u64>,
    min_rows: Option<usize>,
    max_classes: Option<usize>,
    max_one_hot_cardinality: Option<usize>,
    prefer_advanced: Option<bool>,
    n_trees: Option<usize>,
    max_depth: Option<usize>,
    min_samples_split: Option<usize>,
    permutation_repeats: Option<usize>,
    max_rows: Option<usize>,
}

impl AutoMlConfigBuilder {
    /// Force the problem type.
    pub fn problem_type(mut self, problem_type: ProblemType) -> Self {
        self.problem_type = Some(problem_type);
        self
    }

    /// Set the validation fraction.
    pub fn test_size(mut self, size: f64) -> Self {
        self.test_size = Some(size);
        self
    }

    /// Set the random seed.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Set the minimum number of usable rows.
    pub fn min_rows(mut self, rows: usize) -> Self {
        self.min_rows = Some(rows);
        self
    }

    /// Set the class-count limit for integer targets.
    pub fn max_classes(mut self, classes: usize) -> Self {
        self.max_classes = Some(classes);
        self
    }

    /// Set the one-hot cardinality limit for string features.
    pub fn max_one_hot_cardinality(mut self, cardinality: usize) -> Self {
        self.max_one_hot_cardinality = Some(cardinality);
        self
    }

    /// Prefer (or avoid) the ensemble backend.
    pub fn prefer_advanced(mut self, prefer: bool) -> Self {
        self.prefer_advanced = Some(prefer);
        self
    }

    /// Set the number of trees.
    pub fn n_trees(mut self, n: usize) -> Self {
        self.n_trees = Some(n);
        self
    }

    /// Set the maximum tree depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set the minimum samples per split.
    pub fn min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = Some(n);
        self
    }

    /// Set the permutation repeats.
    pub fn permutation_repeats(mut self, n: usize) -> Self {
        self.permutation_repeats = Some(n);
        self
    }

    /// Set the training row cap.
    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<AutoMlConfig, LearningError> {
        let defaults = AutoMlConfig::default();
        let config = AutoMlConfig {
            problem_type: self.problem_type,
            test_size: self.test_size.unwrap_or(defaults.test_size),
            random_seed: self.random_seed.unwrap_or(defaults.random_seed),
            min_rows: self.min_rows.unwrap_or(defaults.min_rows),
            max_classes: self.max_classes.unwrap_or(defaults.max_classes),
            max_one_hot_cardinality: self
                .max_one_hot_cardinality
                .unwrap_or(defaults.max_one_hot_cardinality),
            prefer_advanced: self.prefer_advanced.unwrap_or(defaults.prefer_advanced),
            n_trees: self.n_trees.unwrap_or(defaults.n_trees),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            min_samples_split: self.min_samples_split.unwrap_or(defaults.min_samples_split),
            permutation_repeats: self
                .permutation_repeats
                .unwrap_or(defaults.permutation_repeats),
            max_rows: self.max_rows.unwrap_or(defaults.max_rows),
        };
        config.validate()?;
        Ok(config)
    }
}
