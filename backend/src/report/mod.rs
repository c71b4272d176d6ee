//! Research report
//!
//! The report is assembled once from the final stage's structured result and
//! never changes afterwards; sessions share it as `Arc<Report>`.

pub mod export;

pub use export::{ExportError, ExportFormat, ExportOutcome, ReportExporter};

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// A rendered visual referenced by the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualRef {
    /// Caption shown under the visual
    pub caption: String,
    /// Image location (remote URL or `data:` URL)
    pub url: String,
}

/// Transcript of how the research was carried out
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinkingProcess {
    /// Breakdown of the reasoning steps
    pub reasoning_steps: Vec<String>,
    /// Tools and sources used during the research
    pub tools_used: Vec<String>,
    /// Key decisions made during planning and execution
    pub decisions_made: Vec<String>,
}

/// Final research report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report identifier
    pub id: String,
    /// Session that produced the report
    pub session_id: SessionId,
    /// When the report was assembled
    pub created_at: DateTime<Utc>,
    /// Overview of the research objective and key outcomes
    pub executive_summary: String,
    /// Concise, cited insights
    pub findings: Vec<String>,
    /// Rendered visuals
    pub visuals: Vec<VisualRef>,
    /// Key takeaways and suggested next steps
    pub conclusion: String,
    /// Sources used in the research
    pub references: Vec<String>,
    /// How the research was carried out
    pub thinking_process: ThinkingProcess,
}

/// Field layout expected from the final stage
#[derive(Debug, Deserialize)]
struct ReportFields {
    executive_summary: String,
    #[serde(default, alias = "key_findings")]
    findings: Vec<String>,
    #[serde(default)]
    visuals: Vec<VisualRef>,
    conclusion: String,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    thinking_process: ThinkingProcess,
}

impl Report {
    /// Map a structured result onto the report shape
    ///
    /// Only the shape is checked: `executive_summary` and `conclusion` must be
    /// strings, list fields default to empty.
    pub fn assemble(session_id: &str, result: &Value) -> Result<Self, serde_json::Error> {
        let fields = ReportFields::deserialize(result)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            created_at: Utc::now(),
            executive_summary: fields.executive_summary,
            findings: fields.findings,
            visuals: fields.visuals,
            conclusion: fields.conclusion,
            references: fields.references,
            thinking_process: fields.thinking_process,
        })
    }

    /// Render the report as Markdown
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Research Report\n");
        let _ = writeln!(
            md,
            "_Session {} · {}_\n",
            self.session_id,
            self.created_at.format("%Y-%m-%d %H:%M UTC")
        );

        let _ = writeln!(md, "## Executive Summary\n\n{}\n", self.executive_summary);

        if !self.findings.is_empty() {
            let _ = writeln!(md, "## Key Findings\n");
            for finding in &self.findings {
                let _ = writeln!(md, "- {}", finding);
            }
            md.push('\n');
        }

        if !self.visuals.is_empty() {
            let _ = writeln!(md, "## Visuals\n");
            for visual in &self.visuals {
                let _ = writeln!(md, "![{}]({})\n", visual.caption, visual.url);
            }
        }

        let _ = writeln!(md, "## Conclusion\n\n{}\n", self.conclusion);

        if !self.references.is_empty() {
            let _ = writeln!(md, "## References\n");
            for (i, reference) in self.references.iter().enumerate() {
                let _ = writeln!(md, "{}. {}", i + 1, reference);
            }
            md.push('\n');
        }

        let thinking = &self.thinking_process;
        let sections = [
            ("Reasoning steps", &thinking.reasoning_steps),
            ("Tools used", &thinking.tools_used),
            ("Decisions made", &thinking.decisions_made),
        ];
        if sections.iter().any(|(_, items)| !items.is_empty()) {
            let _ = writeln!(md, "## Thinking Process\n");
            for (title, items) in sections {
                if items.is_empty() {
                    continue;
                }
                let _ = writeln!(md, "### {}\n", title);
                for item in items {
                    let _ = writeln!(md, "- {}", item);
                }
                md.push('\n');
            }
        }

        md.trim_end().to_string() + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_result() -> Value {
        json!({
            "executive_summary": "Solar leads on cost.",
            "key_findings": ["Solar LCOE fell 90% [1]", "Wind is steady [2]"],
            "visuals": [{"caption": "Cost curve", "url": "https://images.example/1.png"}],
            "conclusion": "Prioritize solar.",
            "references": ["IRENA - https://irena.example"],
            "thinking_process": {
                "reasoning_steps": ["Compared LCOE"],
                "tools_used": ["web search"]
            }
        })
    }

    #[test]
    fn test_assemble_maps_fields() {
        let report = Report::assemble("s1", &full_result()).unwrap();
        assert_eq!(report.session_id, "s1");
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.visuals[0].caption, "Cost curve");
        assert_eq!(report.thinking_process.tools_used, vec!["web search"]);
        assert!(report.thinking_process.decisions_made.is_empty());
    }

    #[test]
    fn test_assemble_rejects_wrong_shape() {
        assert!(Report::assemble("s1", &json!({"conclusion": "x"})).is_err());
        assert!(Report::assemble("s1", &json!({"executive_summary": 3, "conclusion": "x"})).is_err());
        assert!(Report::assemble("s1", &json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_markdown_rendering() {
        let report = Report::assemble("s1", &full_result()).unwrap();
        let md = report.to_markdown();
        assert!(md.starts_with("# Research Report\n"));
        assert!(md.contains("## Executive Summary\n\nSolar leads on cost."));
        assert!(md.contains("- Solar LCOE fell 90% [1]"));
        assert!(md.contains("![Cost curve](https://images.example/1.png)"));
        assert!(md.contains("1. IRENA - https://irena.example"));
        assert!(md.contains("### Reasoning steps\n\n- Compared LCOE"));
        assert!(!md.contains("### Decisions made"));
    }
}
