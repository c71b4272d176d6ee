//! Report file export
//!
//! Pure serialization to JSON and Markdown files. There is no retry and no
//! partial-failure handling; any failure surfaces as an [`ExportError`].

use crate::config::ExportConfig;
use crate::report::Report;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while exporting a report
#[derive(Error, Debug)]
pub enum ExportError {
    /// Writing the export file failed
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Serializing the report failed
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON
    Json,
    /// Markdown document
    Markdown,
}

impl ExportFormat {
    /// File extension
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }

    /// Content type for downloads
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            other => Err(format!(
                "unknown report format '{}', expected 'json' or 'markdown'",
                other
            )),
        }
    }
}

/// Result of the export step, carried in the report event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// Files were written
    Completed {
        /// Written file paths
        files: Vec<String>,
    },
    /// Export failed; the report itself is unaffected
    Failed {
        /// Error message
        error: String,
    },
    /// Export is turned off
    Disabled,
}

/// Writes reports to the export directory
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
    enabled: bool,
}

impl ReportExporter {
    /// Create an exporter from configuration
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            enabled: config.enabled,
        }
    }

    /// Render a report in the given format
    pub fn render(report: &Report, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            ExportFormat::Markdown => Ok(report.to_markdown()),
        }
    }

    /// Write the report as JSON and Markdown files
    ///
    /// # Returns
    /// * `Ok(Vec<PathBuf>)` - Paths of the written files
    /// * `Err(ExportError)` - If serialization or any write fails
    pub async fn export(&self, report: &Report) -> Result<Vec<PathBuf>, ExportError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ExportError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let mut written = Vec::with_capacity(2);
        for format in [ExportFormat::Json, ExportFormat::Markdown] {
            let contents = Self::render(report, format)?;
            let path = self.dir.join(format!(
                "{}-{}.{}",
                report.session_id,
                report.id,
                format.extension()
            ));
            tokio::fs::write(&path, contents)
                .await
                .map_err(|source| ExportError::Io {
                    path: path.clone(),
                    source,
                })?;
            written.push(path);
        }
        Ok(written)
    }

    /// Run the export and describe the result for the report event
    pub async fn export_outcome(&self, report: &Report) -> ExportOutcome {
        if !self.enabled {
            return ExportOutcome::Disabled;
        }
        match self.export(report).await {
            Ok(files) => {
                tracing::info!(files = files.len(), dir = %self.dir.display(), "Report exported");
                ExportOutcome::Completed {
                    files: files.iter().map(|p| p.display().to_string()).collect(),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Report export failed");
                ExportOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn report() -> Report {
        Report::assemble(
            "s1",
            &json!({"executive_summary": "Summary", "conclusion": "Done", "findings": ["One"]}),
        )
        .unwrap()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert_eq!("Markdown".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_export_writes_both_files() {
        let temp = TempDir::new().unwrap();
        let exporter = ReportExporter::new(&ExportConfig {
            enabled: true,
            dir: temp.path().join("reports"),
        });
        let report = report();

        let outcome = exporter.export_outcome(&report).await;

        let ExportOutcome::Completed { files } = outcome else {
            panic!("Expected completed export, got: {:?}", outcome);
        };
        assert_eq!(files.len(), 2);
        let json_file = std::fs::read_to_string(&files[0]).unwrap();
        let parsed: Report = serde_json::from_str(&json_file).unwrap();
        assert_eq!(parsed, report);
        assert!(files[1].ends_with(&format!("s1-{}.md", report.id)));
    }

    #[tokio::test]
    async fn test_export_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        // A file where the directory should be.
        let blocker = temp.path().join("blocked");
        std::fs::write(&blocker, "x").unwrap();
        let exporter = ReportExporter::new(&ExportConfig {
            enabled: true,
            dir: blocker,
        });

        let outcome = exporter.export_outcome(&report()).await;
        assert!(matches!(outcome, ExportOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_disabled_export() {
        let exporter = ReportExporter::new(&ExportConfig {
            enabled: false,
            dir: PathBuf::from("/nonexistent"),
        });
        assert_eq!(exporter.export_outcome(&report()).await, ExportOutcome::Disabled);
    }

    #[test]
    fn test_outcome_serialization() {
        let value = serde_json::to_value(ExportOutcome::Failed {
            error: "disk full".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"status": "failed", "error": "disk full"}));
    }
}
