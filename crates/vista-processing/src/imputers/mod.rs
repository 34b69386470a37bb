//! Missing-value imputation.

mod statistical;

pub use statistical::{Filled, MISSING_CATEGORY, StatisticalImputer};
