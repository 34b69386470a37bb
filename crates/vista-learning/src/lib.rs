//! vista-learning: a small, pure-Rust AutoML engine.
//!
//! Given a cleaned [`DataFrame`](polars::prelude::DataFrame) and a target
//! column, the engine detects the problem type, encodes features, fits one
//! model on a seeded train/validation split, and reports metrics plus ranked
//! feature importances.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use vista_learning::{AutoMl, AutoMlConfig, CancellationToken};
//!
//! let config = AutoMlConfig::builder()
//!     .random_seed(7)
//!     .build()?;
//!
//! let engine = AutoMl::new(config)?;
//! let outcome = engine.run(&df, Some("revenue"), &CancellationToken::new())?;
//! ```
//!
//! # Backends
//!
//! Model fitting sits behind the [`ModelBackend`] trait. With the default
//! `ensemble` feature the engine prefers [`RandomForestBackend`]; without it,
//! or with `prefer_advanced(false)`, it uses [`LinearBaseline`]. Both emit the
//! same [`ModelResult`] shape and the same metric keys.
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LearningError>`]. Missing
//! targets and short datasets are not errors: [`AutoMl::run`] returns
//! [`AutoMlOutcome::Skipped`] with a reason instead.
//!
//! # Thread Safety
//!
//! [`AutoMl`] is `Send + Sync` and can run inside a rayon task. The ensemble
//! backend grows trees on the global rayon pool.

mod backend;
mod cancellation;
mod config;
mod dataset;
mod engine;
mod error;
mod importance;
mod metrics;
mod types;

// Re-export public API
//
// Engine
pub use engine::AutoMl;
// Configuration types
pub use config::{AutoMlConfig, AutoMlConfigBuilder, ProblemType};
// Cancellation token
pub use cancellation::CancellationToken;
// Error types
pub use error::{LearningError, Result};
// Backends
pub use backend::{LinearBaseline, ModelBackend, Predictor, select_backend};
#[cfg(feature = "ensemble")]
pub use backend::RandomForestBackend;
// Training data
pub use dataset::{FeatureGroup, TrainingSet};
// Result and metrics types
pub use types::{AutoMlOutcome, FeatureImportance, ImportanceMethod, Metrics, ModelResult};

static_assertions::assert_impl_all!(AutoMl: Send, Sync);
