//! Output bundle: dashboard, insights report, run summary and cleaned data.
//!
//! [`RunSummary`] is the machine-readable record of a run and
//! [`render_markdown`] turns it into the human-readable report.
//! [`ReportWriter`] puts the bundle on disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use vista_processing::reporting::ReportWriter;
//! use vista_processing::config::ExportFormat;
//!
//! let writer = ReportWriter::new("output");
//! writer.write_summary(&summary)?;
//! writer.write_text(ExportFormat::Html, &dashboard_html)?;
//! ```

mod markdown;
mod summary;

pub use markdown::render_markdown;
pub use summary::{DatasetShape, RunSummary, SectionStatus, SummaryParams};

use crate::config::ExportFormat;
use crate::error::{PipelineError, Result, ResultExt};
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name written for each export format.
pub fn file_name(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Html => "dashboard.html",
        ExportFormat::Markdown => "insights_report.md",
        ExportFormat::Json => "run_summary.json",
        ExportFormat::Csv => "cleaned_data.csv",
    }
}

/// Writes the output bundle into one directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, format: ExportFormat) -> PathBuf {
        self.output_dir.join(file_name(format))
    }

    /// Paths that writing `formats` will produce, in the given order.
    pub fn planned_outputs(&self, formats: &[ExportFormat]) -> Vec<PathBuf> {
        formats.iter().map(|f| self.path_for(*f)).collect()
    }

    /// Write a text artifact (dashboard HTML or Markdown report).
    pub fn write_text(&self, format: ExportFormat, contents: &str) -> Result<PathBuf> {
        if matches!(format, ExportFormat::Json | ExportFormat::Csv) {
            return Err(PipelineError::Internal(format!(
                "{} is not a text artifact",
                file_name(format)
            )));
        }
        let path = self.path_for(format);
        self.write_bytes(&path, contents.as_bytes())?;
        info!("Report saved: {}", path.display());
        Ok(path)
    }

    pub fn write_summary<T: serde::Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let path = self.path_for(ExportFormat::Json);
        let json = serde_json::to_string_pretty(summary)?;
        self.write_bytes(&path, json.as_bytes())?;
        info!("Run summary saved: {}", path.display());
        Ok(path)
    }

    pub fn write_dataset(&self, df: &DataFrame) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path_for(ExportFormat::Csv);
        let mut file = File::create(&path).context(format!("cannot create {}", path.display()))?;
        let mut df = df.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(&mut df)?;
        info!("Dataset saved: {}", path.display());
        Ok(path)
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .context(format!("cannot create {}", self.output_dir.display()))
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir()?;
        let mut file = File::create(path).context(format!("cannot create {}", path.display()))?;
        file.write_all(bytes)
            .context(format!("cannot write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_planned_outputs_follow_format_order() {
        let writer = ReportWriter::new("out");
        let planned = writer.planned_outputs(&ExportFormat::defaults());
        assert_eq!(
            planned,
            vec![
                PathBuf::from("out/dashboard.html"),
                PathBuf::from("out/insights_report.md"),
                PathBuf::from("out/run_summary.json"),
            ]
        );
    }

    #[test]
    fn test_writes_into_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("nested").join("run"));

        let html = writer.write_text(ExportFormat::Html, "<html></html>").unwrap();
        assert_eq!(fs::read_to_string(html).unwrap(), "<html></html>");

        let json = writer.write_summary(&serde_json::json!({"status": "completed"})).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
        assert_eq!(parsed["status"], "completed");

        let df = df!("region" => &["East", "West"], "revenue" => &[1.5, 2.0]).unwrap();
        let csv = writer.write_dataset(&df).unwrap();
        let text = fs::read_to_string(csv).unwrap();
        assert_eq!(text.lines().next(), Some("region,revenue"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_rejects_binary_formats_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path());
        assert!(writer.write_text(ExportFormat::Csv, "a,b").is_err());
    }
}
