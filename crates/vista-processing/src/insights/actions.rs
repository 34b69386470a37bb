//! Recommended actions, looked up by what an insight is about.
//!
//! One action per [`ActionKey`], so two insights about the same evidence can
//! never recommend different things.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKey {
    HighNullRate,
    CriticalNullRate,
    TypeMismatch,
    Duplicates,
    OutlierHeavy,
    SkippedCleaning,
    StrongCorrelation,
    ModerateCorrelation,
    Anomalies,
    Clusters,
    RisingTrend,
    FallingTrend,
    Seasonality,
    StrongModel,
    WeakModel,
    Skewed,
    DominantCategory,
    Constant,
}

pub fn recommended_action(key: ActionKey) -> &'static str {
    match key {
        ActionKey::HighNullRate => {
            "Check why values are missing before relying on imputed figures"
        }
        ActionKey::CriticalNullRate => {
            "Drop the column or recover it from the source; it is almost entirely empty"
        }
        ActionKey::TypeMismatch => {
            "Standardize the value format at the source so every value parses"
        }
        ActionKey::Duplicates => {
            "Confirm whether repeated rows are legitimate or a double export"
        }
        ActionKey::OutlierHeavy => "Investigate the data collection process for this column",
        ActionKey::SkippedCleaning => "Clean this column manually and rerun the analysis",
        ActionKey::StrongCorrelation => {
            "Treat the pair as redundant in models and check for a shared driver"
        }
        ActionKey::ModerateCorrelation => "Explore the relationship with a segmented view",
        ActionKey::Anomalies => "Review the flagged rows for errors or exceptional events",
        ActionKey::Clusters => "Profile each segment and tailor actions per segment",
        ActionKey::RisingTrend => "Plan capacity for continued growth and confirm the driver",
        ActionKey::FallingTrend => "Find the cause of the decline before it compounds",
        ActionKey::Seasonality => "Align planning and forecasts with the seasonal cycle",
        ActionKey::StrongModel => "Use the top drivers to prioritize levers on the target",
        ActionKey::WeakModel => "Collect additional features before acting on predictions",
        ActionKey::Skewed => "Report medians rather than means and consider a log scale",
        ActionKey::DominantCategory => "Check whether the rare categories are worth tracking",
        ActionKey::Constant => "Remove the column from analyses; it carries no information",
    }
}
