//! Execution report

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use swiftcheck_common::FixtureSet;

use crate::error::{E2eError, E2eResult, FailureKind};

/// Why a fixture failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&E2eError> for FailureRecord {
    fn from(err: &E2eError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureOutcome {
    pub fixture_id: String,
    pub name: String,
    pub passed: bool,
    pub expected: String,

    /// Last observed output, if any was read
    pub actual: Option<String>,

    /// Wall time of all executions of this fixture
    pub duration_ms: u64,

    /// Input-to-read latency of the last execution that produced output
    pub translation_ms: Option<u64>,

    pub failure: Option<FailureRecord>,

    /// Observations differed between repetitions
    #[serde(default)]
    pub flaky: bool,

    /// Output of every execution that produced one, in order
    #[serde(default)]
    pub observations: Vec<String>,
}

/// Result of a whole run, in fixture-table order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub target_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub flaky: usize,
    pub duration_ms: u64,

    /// Set when a setup failure stopped the run before any case
    pub aborted: Option<String>,

    pub outcomes: Vec<FixtureOutcome>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        target_url: impl Into<String>,
        duration_ms: u64,
        outcomes: Vec<FixtureOutcome>,
    ) -> Self {
        let passed = outcomes.iter().filter(|o| o.passed).count();
        Self {
            started_at,
            target_url: target_url.into(),
            total: outcomes.len(),
            passed,
            failed: outcomes.len() - passed,
            flaky: outcomes.iter().filter(|o| o.flaky).count(),
            duration_ms,
            aborted: None,
            outcomes,
        }
    }

    /// A run that never executed a case. Every planned fixture is listed as
    /// failed with the abort reason.
    pub fn aborted(
        started_at: DateTime<Utc>,
        target_url: impl Into<String>,
        planned: &FixtureSet,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let outcomes: Vec<FixtureOutcome> = planned
            .iter()
            .map(|fixture| FixtureOutcome {
                fixture_id: fixture.id.clone(),
                name: fixture.name.clone(),
                passed: false,
                expected: fixture.expected_output.clone(),
                actual: None,
                duration_ms: 0,
                translation_ms: None,
                failure: Some(FailureRecord {
                    kind: FailureKind::Navigation,
                    message: format!("run aborted: {}", reason),
                }),
                flaky: false,
                observations: Vec::new(),
            })
            .collect();

        Self {
            started_at,
            target_url: target_url.into(),
            total: outcomes.len(),
            passed: 0,
            failed: outcomes.len(),
            flaky: 0,
            duration_ms: 0,
            aborted: Some(reason),
            outcomes,
        }
    }

    pub fn success(&self) -> bool {
        self.aborted.is_none() && self.failed == 0
    }

    /// 0 when everything passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &FixtureOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> E2eResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path.to_path_buf())
    }

    pub fn from_json_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Human-readable table, one row per fixture
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["ID", "Name", "Result", "Expected", "Actual", "ms"]);

        for outcome in &self.outcomes {
            let result = match (&outcome.failure, outcome.passed, outcome.flaky) {
                (_, true, false) => "pass".to_string(),
                (_, true, true) => "pass (flaky)".to_string(),
                (Some(failure), false, _) => failure.kind.to_string(),
                (None, false, _) => "fail".to_string(),
            };
            table.add_row(vec![
                outcome.fixture_id.clone(),
                outcome.name.clone(),
                result,
                visible_whitespace(&outcome.expected),
                outcome
                    .actual
                    .as_deref()
                    .map(visible_whitespace)
                    .unwrap_or_else(|| "-".to_string()),
                outcome.duration_ms.to_string(),
            ]);
        }

        let mut rendered = table.to_string();
        rendered.push('\n');
        match &self.aborted {
            Some(reason) => rendered.push_str(&format!("Run aborted: {}\n", reason)),
            None => rendered.push_str(&format!(
                "{} passed, {} failed, {} flaky ({} ms)\n",
                self.passed, self.failed, self.flaky, self.duration_ms
            )),
        }
        rendered
    }

    pub fn render(&self, format: ReportFormat) -> E2eResult<String> {
        match format {
            ReportFormat::Table => Ok(self.render_table()),
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

/// Console rendering of a report
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON document
    Json,
}

/// Make newlines and runs of spaces visible in a table cell
fn visible_whitespace(text: &str) -> String {
    text.replace('\n', "⏎").replace("  ", "··")
}
