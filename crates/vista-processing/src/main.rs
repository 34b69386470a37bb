//! CLI entry point for the analytics pipeline.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::{error, info};
use vista_processing::config::{CorrelationMethod, ExportFormat, PipelineConfig, Theme};
use vista_processing::{Pipeline, PipelineOutcome};

/// CLI-compatible dashboard theme enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTheme {
    Light,
    Dark,
}

impl From<CliTheme> for Theme {
    fn from(cli: CliTheme) -> Self {
        match cli {
            CliTheme::Light => Theme::Light,
            CliTheme::Dark => Theme::Dark,
        }
    }
}

/// CLI-compatible export format enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliExport {
    /// dashboard.html
    Html,
    /// insights_report.md
    Markdown,
    /// run_summary.json
    Json,
    /// cleaned_data.csv
    Csv,
}

impl From<CliExport> for ExportFormat {
    fn from(cli: CliExport) -> Self {
        match cli {
            CliExport::Html => ExportFormat::Html,
            CliExport::Markdown => ExportFormat::Markdown,
            CliExport::Json => ExportFormat::Json,
            CliExport::Csv => ExportFormat::Csv,
        }
    }
}

/// CLI-compatible correlation method enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCorrelation {
    Pearson,
    Spearman,
    Kendall,
}

impl From<CliCorrelation> for CorrelationMethod {
    fn from(cli: CliCorrelation) -> Self {
        match cli {
            CliCorrelation::Pearson => CorrelationMethod::Pearson,
            CliCorrelation::Spearman => CorrelationMethod::Spearman,
            CliCorrelation::Kendall => CorrelationMethod::Kendall,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "CSV in, dashboard out: validation, statistics, patterns, AutoML and an HTML dashboard",
    long_about = "Runs a CSV file through schema inference, validation, cleaning, statistics, \
                  pattern detection and optional AutoML, then writes a self-contained HTML \
                  dashboard, a Markdown insights report and a JSON run summary.\n\n\
                  EXAMPLES:\n  \
                  # Dashboard only\n  \
                  vista sales.csv\n\n  \
                  # Regression on revenue with a time axis\n  \
                  vista sales.csv --target revenue --time-col date -o reports/\n\n  \
                  # Fail on error-severity validation findings\n  \
                  vista sales.csv --strict"
)]
struct Args {
    /// Path to the delimited file to analyze
    input: PathBuf,

    /// Column to predict; AutoML is skipped without one
    #[arg(short, long)]
    target: Option<String>,

    /// Datetime column used for trend and seasonality detection
    #[arg(long = "time-col")]
    time_col: Option<String>,

    /// Business context; insights about matching columns rank first
    #[arg(long)]
    context: Option<String>,

    /// Output directory for the dashboard, report and summary
    #[arg(short, long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// JSON config file; flags given on the command line override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read at most this many rows
    #[arg(long)]
    sample_size: Option<usize>,

    /// Abort on error-severity validation findings
    #[arg(long)]
    strict: bool,

    /// Keep outliers instead of capping them at the fences
    #[arg(long)]
    no_cap_outliers: bool,

    /// Remove exact duplicate rows
    #[arg(long)]
    remove_duplicates: bool,

    /// Dashboard theme
    #[arg(long, value_enum)]
    theme: Option<CliTheme>,

    /// Embed the dashboard payload gzip-compressed
    #[arg(long)]
    compress: bool,

    /// Files to write (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    export: Vec<CliExport>,

    /// Correlation coefficient
    #[arg(long, value_enum)]
    correlation: Option<CliCorrelation>,

    /// Train only the linear baseline model
    #[arg(long)]
    baseline_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Print the run summary as JSON to stdout instead of the text summary
    ///
    /// Disables all logs so stdout only carries JSON.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` wins over the command line. Nothing is initialized for
/// `--json` so stdout stays machine-readable.
fn init_logging(args: &Args) {
    if args.json {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        args.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(target) = &args.target {
        config.target_column = Some(target.clone());
    }
    if let Some(time_col) = &args.time_col {
        config.time_column = Some(time_col.clone());
    }
    if let Some(context) = &args.context {
        config.business_context = Some(context.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(rows) = args.sample_size {
        config.sample_size = Some(rows);
    }
    if let Some(theme) = args.theme {
        config.theme = theme.into();
    }
    if let Some(method) = args.correlation {
        config.correlation_method = method.into();
    }
    if !args.export.is_empty() {
        config.export_formats = args.export.iter().map(|e| (*e).into()).collect();
    }
    config.strict_validation |= args.strict;
    config.remove_duplicates |= args.remove_duplicates;
    config.compress_payload |= args.compress;
    if args.no_cap_outliers {
        config.cap_outliers = false;
    }
    if args.baseline_only {
        config.prefer_advanced_model = false;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args);

    if !args.input.exists() {
        return Err(anyhow!("Input file not found: {}", args.input.display()));
    }

    let config = build_config(&args)?;
    let mut builder = Pipeline::builder().config(config);
    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:>3.0}%] {}: {}",
                update.percent(),
                update.stage.display_name(),
                update.message
            );
        });
    }
    let pipeline = builder.build()?;

    match pipeline.run_file(&args.input) {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
            } else {
                print_human_readable_summary(&outcome);
            }
            Ok(())
        }
        Err(e) => {
            if args.json
                && let Some(run) = pipeline.registry().latest()
            {
                println!("{}", serde_json::to_string_pretty(&run)?);
            }
            let stage = e
                .stage()
                .map(|s| s.display_name())
                .unwrap_or("Unknown stage");
            error!("Pipeline failed: {}", e);
            Err(anyhow!("pipeline failed during {} ({}): {}", stage, e.error_code(), e))
        }
    }
}

/// Print a human-readable summary of the run.
///
/// Uses `println!` intentionally: this is the command's result, not a log.
fn print_human_readable_summary(outcome: &PipelineOutcome) {
    let summary = &outcome.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("ANALYSIS COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!("Input:    {}", summary.input);
    println!("Run:      {}", summary.run_id);
    println!("Duration: {}ms", summary.duration_ms);
    println!(
        "Rows:     {} -> {}   Columns: {}",
        summary.dataset.rows_before, summary.dataset.rows_after, summary.dataset.columns
    );
    println!(
        "Quality:  {:.1}% -> {:.1}%",
        summary.dataset.quality_before * 100.0,
        summary.dataset.quality_after * 100.0
    );
    println!();

    println!("Sections:");
    for section in &summary.sections {
        match &section.reason {
            Some(reason) => println!("  {:<12} {} ({})", section.section, section.status, reason),
            None => println!("  {:<12} {}", section.section, section.status),
        }
    }
    if let Some(model) = &summary.model {
        println!(
            "  model: {} on '{}', score {}",
            model.model_name,
            model.target,
            model
                .primary_score()
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }
    println!();

    if !outcome.insights.is_empty() {
        println!("Top insights:");
        for insight in outcome.insights.iter().take(5) {
            println!("  [P{}] {}", insight.priority, insight.statement);
        }
        if outcome.insights.len() > 5 {
            println!("  ... and {} more", outcome.insights.len() - 5);
        }
        println!();
    }

    if !summary.errors.is_empty() {
        println!("Recoverable errors:");
        for error in &summary.errors {
            println!("  ! {}: {}", error.code, error.message);
        }
        println!();
    }

    if outcome.outputs.is_empty() {
        println!("No files written (save_to_disk is off)");
    } else {
        println!("Outputs:");
        for path in &outcome.outputs {
            println!("  {}", path.display());
        }
    }
    println!("{}", "=".repeat(80));
}
