//! Ranked, templated insights drawn from the analysis.
//!
//! Priority 1 covers data-quality problems and strong correlations
//! (|r| > 0.7), priority 2 anomalies, clusters, trends and the model, and
//! priority 3 moderate correlations and distribution notes. Statements are
//! templated from their evidence, so the same inputs always give the same
//! list. Within a priority, insights touching columns named in the business
//! context come first; otherwise generation order is kept.

mod actions;

pub use actions::{ActionKey, recommended_action};

use crate::analysis::AnalysisResult;
use crate::cleaner::TransformationLog;
use crate::patterns::TrendDirection;
use crate::quality::{IssueKind, Severity, ValidationReport};
use crate::statistics::{ColumnStatistics, DistributionShape};
use crate::utils::round_to;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use vista_learning::ProblemType;

/// |r| above which a correlation is strong.
pub const STRONG_CORRELATION: f64 = 0.7;
/// |r| above which a correlation is worth a note.
pub const MODERATE_CORRELATION: f64 = 0.3;

const SKEW_NOTE_THRESHOLD: f64 = 1.0;
const DOMINANT_SHARE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    DataQuality,
    Correlation,
    Anomaly,
    Cluster,
    Trend,
    Seasonality,
    Model,
    Distribution,
}

impl InsightCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataQuality => "data_quality",
            Self::Correlation => "correlation",
            Self::Anomaly => "anomaly",
            Self::Cluster => "cluster",
            Self::Trend => "trend",
            Self::Seasonality => "seasonality",
            Self::Model => "model",
            Self::Distribution => "distribution",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::DataQuality => "Data quality",
            Self::Correlation => "Correlation",
            Self::Anomaly => "Anomalies",
            Self::Cluster => "Segments",
            Self::Trend => "Trend",
            Self::Seasonality => "Seasonality",
            Self::Model => "Predictive model",
            Self::Distribution => "Distribution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// 1 is highest.
    pub priority: u8,
    pub category: InsightCategory,
    pub statement: String,
    /// Dotted path into the run results backing the statement, e.g.
    /// `statistics.correlations.price~units`.
    pub evidence: String,
    pub recommended_action: String,
    /// Columns the insight is about.
    pub columns: Vec<String>,
    /// A column matched a business-context keyword.
    pub context_match: bool,
}

/// Builds the ranked insight list for one run.
#[derive(Debug, Clone, Default)]
pub struct InsightGenerator {
    keywords: Vec<String>,
}

impl InsightGenerator {
    pub fn new(business_context: Option<&str>) -> Self {
        let keywords = business_context
            .map(|context| {
                context
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|word| word.len() >= 3)
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();
        Self { keywords }
    }

    pub fn generate(
        &self,
        analysis: &AnalysisResult,
        validation: &ValidationReport,
        log: &TransformationLog,
    ) -> Vec<Insight> {
        let mut insights = Vec::new();
        quality_insights(validation, log, &mut insights);
        correlation_insights(analysis, &mut insights);
        pattern_insights(analysis, &mut insights);
        model_insights(analysis, &mut insights);
        distribution_insights(analysis, &mut insights);

        let mut seen = HashSet::new();
        insights.retain(|insight| seen.insert(insight.evidence.clone()));
        for insight in &mut insights {
            insight.context_match = self.matches_context(&insight.columns);
        }
        // stable, so generation order breaks ties
        insights.sort_by_key(|i| (i.priority, !i.context_match));
        debug!("Generated {} insights", insights.len());
        insights
    }

    fn matches_context(&self, columns: &[String]) -> bool {
        columns.iter().any(|column| {
            let column = column.to_lowercase();
            self.keywords
                .iter()
                .any(|k| column.contains(k.as_str()) || k.contains(column.as_str()))
        })
    }
}

fn insight(
    priority: u8,
    category: InsightCategory,
    statement: String,
    evidence: String,
    action: ActionKey,
    columns: Vec<String>,
) -> Insight {
    Insight {
        priority,
        category,
        statement,
        evidence,
        recommended_action: recommended_action(action).to_string(),
        columns,
        context_match: false,
    }
}

fn percent(rate: f64) -> String {
    format!("{}%", round_to(rate * 100.0, 1))
}

// =============================================================================
// Priority 1: quality and strong correlations
// =============================================================================

fn quality_insights(validation: &ValidationReport, log: &TransformationLog, out: &mut Vec<Insight>) {
    for finding in &validation.findings {
        let column = finding.column.clone().unwrap_or_else(|| "dataset".to_string());
        let (statement, action) = match finding.issue_kind {
            IssueKind::NullRateExceeded if finding.severity == Severity::Error => (
                format!("`{}` is {} empty ({} missing values)", column, percent(finding.rate), finding.count),
                ActionKey::CriticalNullRate,
            ),
            IssueKind::NullRateExceeded => (
                format!("`{}` has {} missing values", column, percent(finding.rate)),
                ActionKey::HighNullRate,
            ),
            IssueKind::TypeMismatch => (
                format!("{} values in `{}` did not match its type and were cleared", finding.count, column),
                ActionKey::TypeMismatch,
            ),
            IssueKind::DuplicateRows => (
                format!("{} rows ({}) exactly duplicate an earlier row", finding.count, percent(finding.rate)),
                ActionKey::Duplicates,
            ),
            IssueKind::OutlierCount => (
                format!("`{}` has {} outliers ({} of values)", column, finding.count, percent(finding.rate)),
                ActionKey::OutlierHeavy,
            ),
        };
        out.push(insight(
            1,
            InsightCategory::DataQuality,
            statement,
            format!("validation.{}.{}", finding.issue_kind.as_str(), column),
            action,
            finding.column.iter().cloned().collect(),
        ));
    }

    for skipped in &log.skipped {
        out.push(insight(
            1,
            InsightCategory::DataQuality,
            format!(
                "Cleaning step {} could not be applied to `{}`: {}",
                skipped.operation.as_str(),
                skipped.column,
                skipped.reason
            ),
            format!("transformation.skipped.{}.{}", skipped.operation.as_str(), skipped.column),
            ActionKey::SkippedCleaning,
            vec![skipped.column.clone()],
        ));
    }
}

fn correlation_insights(analysis: &AnalysisResult, out: &mut Vec<Insight>) {
    let Some(stats) = analysis.statistics() else {
        return;
    };
    let method = stats.correlations.method.as_str();
    for pair in stats.correlations.pairs() {
        let r = pair.coefficient;
        let (priority, strength, action) = if r.abs() > STRONG_CORRELATION {
            (1, "strongly", ActionKey::StrongCorrelation)
        } else if r.abs() > MODERATE_CORRELATION {
            (3, "moderately", ActionKey::ModerateCorrelation)
        } else {
            continue;
        };
        let sign = if r > 0.0 { "positively" } else { "negatively" };
        out.push(insight(
            priority,
            InsightCategory::Correlation,
            format!(
                "`{}` and `{}` are {} {} correlated ({} r={:.2})",
                pair.left, pair.right, strength, sign, method, r
            ),
            format!("statistics.correlations.{}~{}", pair.left, pair.right),
            action,
            vec![pair.left.clone(), pair.right.clone()],
        ));
    }
}

// =============================================================================
// Priority 2: patterns and the model
// =============================================================================

fn pattern_insights(analysis: &AnalysisResult, out: &mut Vec<Insight>) {
    if let Some(anomalies) = analysis.patterns.anomalies.completed()
        && anomalies.flagged_count > 0
    {
        let top = anomalies
            .top
            .first()
            .map(|a| format!("; the most unusual is row {} (score {:.2})", a.row, a.score))
            .unwrap_or_default();
        out.push(insight(
            2,
            InsightCategory::Anomaly,
            format!(
                "{} of {} rows ({}) look anomalous across {}{}",
                anomalies.flagged_count,
                anomalies.scored_rows,
                percent(anomalies.flagged_rate()),
                anomalies.features.join(", "),
                top
            ),
            "patterns.anomalies".to_string(),
            ActionKey::Anomalies,
            anomalies.features.clone(),
        ));
    }

    if let Some(clustering) = analysis.patterns.clustering.completed()
        && let Some(largest) = clustering.clusters.iter().max_by_key(|c| c.size)
    {
        let side = if largest.defining_offset >= 0.0 { "high" } else { "low" };
        out.push(insight(
            2,
            InsightCategory::Cluster,
            format!(
                "Rows fall into {} segments; the largest ({}) is marked by {} `{}`",
                clustering.k,
                percent(largest.share),
                side,
                largest.defining_feature
            ),
            "patterns.clustering".to_string(),
            ActionKey::Clusters,
            clustering.features.clone(),
        ));
    }

    if let Some(trends) = analysis.patterns.trends.completed() {
        for series in &trends.series {
            let action = match series.direction {
                TrendDirection::Increasing => Some(("increasing", ActionKey::RisingTrend)),
                TrendDirection::Decreasing => Some(("decreasing", ActionKey::FallingTrend)),
                TrendDirection::Flat => None,
            };
            if let Some((word, action)) = action {
                let change = series
                    .relative_change
                    .map(|c| format!(", {} over the period", percent(c)))
                    .unwrap_or_default();
                out.push(insight(
                    2,
                    InsightCategory::Trend,
                    format!(
                        "`{}` is {} over `{}` ({:+.4} per day, p={:.3}{})",
                        series.column, word, trends.time_column, series.slope_per_day, series.p_value, change
                    ),
                    format!("patterns.trends.{}", series.column),
                    action,
                    vec![series.column.clone(), trends.time_column.clone()],
                ));
            }
            if let Some(season) = &series.seasonality {
                out.push(insight(
                    2,
                    InsightCategory::Seasonality,
                    format!(
                        "`{}` repeats every {} time points (about {} days, autocorrelation {:.2})",
                        series.column,
                        season.period,
                        round_to(season.period_days, 1),
                        season.autocorrelation
                    ),
                    format!("patterns.seasonality.{}", series.column),
                    ActionKey::Seasonality,
                    vec![series.column.clone()],
                ));
            }
        }
    }
}

fn model_insights(analysis: &AnalysisResult, out: &mut Vec<Insight>) {
    let Some(model) = analysis.model() else {
        return;
    };
    let Some(score) = model.primary_score() else {
        return;
    };
    let (metric, strong) = if model.task_type == ProblemType::Classification {
        ("accuracy", score >= 0.7)
    } else {
        ("R²", score >= 0.5)
    };
    let drivers: Vec<String> = model
        .feature_importances
        .iter()
        .take(3)
        .map(|f| format!("`{}` ({})", f.feature, percent(f.importance)))
        .collect();
    let drivers = if drivers.is_empty() {
        String::new()
    } else {
        format!("; top drivers: {}", drivers.join(", "))
    };
    let mut columns = vec![model.target.clone()];
    columns.extend(model.feature_importances.iter().take(3).map(|f| f.feature.clone()));
    out.push(insight(
        2,
        InsightCategory::Model,
        format!(
            "A {} model predicts `{}` with {} {:.2}{}",
            model.model_name, model.target, metric, score, drivers
        ),
        "model.metrics".to_string(),
        if strong { ActionKey::StrongModel } else { ActionKey::WeakModel },
        columns,
    ));
}

// =============================================================================
// Priority 3: distribution notes
// =============================================================================

fn distribution_insights(analysis: &AnalysisResult, out: &mut Vec<Insight>) {
    let Some(stats) = analysis.statistics() else {
        return;
    };
    for (column, column_stats) in &stats.columns {
        let evidence = format!("statistics.columns.{column}");
        let note = match column_stats {
            ColumnStatistics::Numeric(n) if n.shape == DistributionShape::Constant => Some((
                format!("`{}` has a single value ({})", column, n.min),
                ActionKey::Constant,
            )),
            ColumnStatistics::Numeric(n) => n
                .skewness
                .filter(|s| s.abs() > SKEW_NOTE_THRESHOLD)
                .map(|s| {
                    let side = if s > 0.0 { "right" } else { "left" };
                    (
                        format!(
                            "`{}` is {}-skewed (skewness {:.2}); median {} vs mean {}",
                            column,
                            side,
                            s,
                            round_to(n.median, 2),
                            round_to(n.mean, 2)
                        ),
                        ActionKey::Skewed,
                    )
                }),
            ColumnStatistics::Categorical(c) if c.cardinality == 1 => Some((
                format!("`{}` has a single category", column),
                ActionKey::Constant,
            )),
            ColumnStatistics::Categorical(c) if c.mode_share() >= DOMINANT_SHARE => {
                c.mode.as_ref().map(|mode| {
                    (
                        format!("`{}` is dominated by '{}' ({} of rows)", column, mode, percent(c.mode_share())),
                        ActionKey::DominantCategory,
                    )
                })
            }
            _ => None,
        };
        if let Some((statement, action)) = note {
            out.push(insight(
                3,
                InsightCategory::Distribution,
                statement,
                evidence,
                action,
                vec![column.clone()],
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SectionOutcome;
    use crate::config::CorrelationMethod;
    use crate::patterns::PatternReport;
    use crate::quality::ValidationFinding;
    use crate::statistics::{CorrelationMatrix, StatisticsReport};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn analysis() -> AnalysisResult {
        let a: Vec<Option<f64>> = (0..20).map(|i| Some(i as f64)).collect();
        let b: Vec<Option<f64>> = (0..20).map(|i| Some(2.0 * i as f64 + (i % 2) as f64)).collect();
        let c: Vec<Option<f64>> = (0..20).map(|i| Some(((i * 7) % 11) as f64 + i as f64 * 0.3)).collect();
        let correlations = CorrelationMatrix::compute(
            CorrelationMethod::Pearson,
            &[("price".to_string(), a), ("units".to_string(), b), ("noise".to_string(), c)],
        );
        AnalysisResult {
            statistics: SectionOutcome::Completed(StatisticsReport {
                columns: BTreeMap::new(),
                correlations,
            }),
            patterns: PatternReport {
                clustering: SectionOutcome::skipped("n/a"),
                anomalies: SectionOutcome::skipped("n/a"),
                trends: SectionOutcome::skipped("no time column provided"),
            },
            model: SectionOutcome::skipped("no target provided"),
        }
    }

    fn nulls_finding() -> ValidationReport {
        ValidationReport {
            findings: vec![ValidationFinding {
                column: Some("notes".to_string()),
                issue_kind: IssueKind::NullRateExceeded,
                severity: Severity::Warning,
                count: 12,
                rate: 0.6,
                message: String::new(),
                suggested_action: String::new(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_sorted_by_priority() {
        let insights = InsightGenerator::default().generate(
            &analysis(),
            &nulls_finding(),
            &TransformationLog::default(),
        );
        assert!(!insights.is_empty());
        assert!(insights.windows(2).all(|w| w[0].priority <= w[1].priority));
        assert_eq!(insights[0].category, InsightCategory::DataQuality);
        let strong = insights
            .iter()
            .find(|i| i.evidence == "statistics.correlations.price~units")
            .unwrap();
        assert_eq!(strong.priority, 1);
        assert!(strong.statement.contains("strongly positively correlated"));
    }

    #[test]
    fn test_evidence_is_unique_and_actions_consistent() {
        let insights = InsightGenerator::default().generate(
            &analysis(),
            &nulls_finding(),
            &TransformationLog::default(),
        );
        let evidence: HashSet<&str> = insights.iter().map(|i| i.evidence.as_str()).collect();
        assert_eq!(evidence.len(), insights.len());
    }

    #[test]
    fn test_business_context_reorders_within_tier() {
        let neutral = InsightGenerator::default().generate(
            &analysis(),
            &nulls_finding(),
            &TransformationLog::default(),
        );
        assert_eq!(neutral[0].columns, vec!["notes".to_string()]);

        let focused = InsightGenerator::new(Some("We care about unit price margins")).generate(
            &analysis(),
            &nulls_finding(),
            &TransformationLog::default(),
        );
        assert_eq!(focused[0].evidence, "statistics.correlations.price~units");
        assert!(focused[0].context_match);
        assert!(focused.windows(2).all(|w| w[0].priority <= w[1].priority));
    }

    #[test]
    fn test_deterministic() {
        let generator = InsightGenerator::new(Some("price"));
        let first = generator.generate(&analysis(), &nulls_finding(), &TransformationLog::default());
        let second = generator.generate(&analysis(), &nulls_finding(), &TransformationLog::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_nothing_to_say() {
        let empty = AnalysisResult {
            statistics: SectionOutcome::skipped("none"),
            ..analysis()
        };
        let insights =
            InsightGenerator::default().generate(&empty, &ValidationReport::default(), &TransformationLog::default());
        assert!(insights.is_empty());
    }
}
