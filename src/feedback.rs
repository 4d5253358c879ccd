//! Test reports and the feedback stage.
//!
//! A report is read from a file. `.json` files hold a structured report:
//!
//! ```json
//! {
//!   "summary": { "passed": 3, "failed": 3, "skipped": 0 },
//!   "tests": [ { "name": "valid_discount", "outcome": "failed", "message": "80 != 90" } ]
//! }
//! ```
//!
//! Anything else (a markdown report, captured `cargo test` output) is kept
//! verbatim; pass/fail counts are picked out of lines such as
//! `3 passed, 3 failed` or `test result: FAILED. 3 passed; 3 failed`.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::config::{Config, Credentials};
use crate::embedding::create_embedder;
use crate::error::{Error, Result};
use crate::llm::OpenAiChat;
use crate::orchestrator::{Artifacts, Orchestrator, FEEDBACK_FILE};
use crate::schema::CODE_COLLECTION;
use crate::search::Retriever;
use crate::store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub passed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub skipped: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub outcome: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonReport {
    summary: ReportSummary,
    #[serde(default)]
    tests: Vec<TestOutcome>,
}

/// A parsed test-execution report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    /// `None` when a text report carried no recognizable counts.
    pub summary: Option<ReportSummary>,
    pub tests: Vec<TestOutcome>,
    /// Verbatim text for text reports; empty for JSON reports.
    pub raw: String,
}

impl TestReport {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Report(format!("{}: {}", path.display(), e)))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_text(&content)
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let report: JsonReport =
            serde_json::from_str(content).map_err(|e| Error::Report(e.to_string()))?;
        Ok(Self {
            summary: Some(report.summary),
            tests: report.tests,
            raw: String::new(),
        })
    }

    pub fn from_text(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Err(Error::Report("report is empty".to_string()));
        }
        Ok(Self {
            summary: parse_counts(content),
            tests: Vec::new(),
            raw: content.trim_end().to_string(),
        })
    }

    /// Text embedded into the feedback prompt.
    pub fn render(&self) -> String {
        if !self.raw.is_empty() {
            return self.raw.clone();
        }

        let mut out = String::new();
        if let Some(s) = self.summary {
            out.push_str(&format!(
                "{} passed, {} failed, {} skipped\n",
                s.passed, s.failed, s.skipped
            ));
        }
        for test in &self.tests {
            match &test.message {
                Some(message) => {
                    out.push_str(&format!("- {}: {} ({})\n", test.name, test.outcome, message))
                }
                None => out.push_str(&format!("- {}: {}\n", test.name, test.outcome)),
            }
        }
        out.trim_end().to_string()
    }
}

/// Extract counts from a text report.
///
/// `cargo test` prints one `test result:` line per test binary; those are
/// summed. Otherwise the last line carrying any count wins, since runners
/// print their summary at the end.
fn parse_counts(content: &str) -> Option<ReportSummary> {
    let result_lines: Vec<ReportSummary> = content
        .lines()
        .filter(|l| l.contains("test result:"))
        .filter_map(line_counts)
        .collect();
    if !result_lines.is_empty() {
        return Some(result_lines.iter().fold(ReportSummary::default(), |acc, s| {
            ReportSummary {
                passed: acc.passed.saturating_add(s.passed),
                failed: acc.failed.saturating_add(s.failed),
                skipped: acc.skipped.saturating_add(s.skipped),
            }
        }));
    }

    content.lines().rev().find_map(line_counts)
}

/// Counts on one line: a number immediately followed by `passed`, `failed`,
/// `skipped`, or `ignored`.
fn line_counts(line: &str) -> Option<ReportSummary> {
    let words: Vec<&str> = line
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut summary = ReportSummary::default();
    let mut found = false;
    for pair in words.windows(2) {
        let Ok(n) = pair[0].parse::<u32>() else {
            continue;
        };
        match pair[1].to_ascii_lowercase().as_str() {
            "passed" => summary.passed = summary.passed.saturating_add(n),
            "failed" => summary.failed = summary.failed.saturating_add(n),
            "skipped" | "ignored" => summary.skipped = summary.skipped.saturating_add(n),
            _ => continue,
        }
        found = true;
    }
    found.then_some(summary)
}

/// `testgen feedback`
pub async fn run_feedback(
    config: &Config,
    tests_path: &Path,
    report_path: &Path,
    code_path: Option<&Path>,
    function: Option<&str>,
) -> anyhow::Result<()> {
    let credentials = Credentials::from_env(config);
    let model = OpenAiChat::new(&config.generation, &credentials)
        .context("failed to create chat model")?;

    let unit_tests = std::fs::read_to_string(tests_path)
        .with_context(|| format!("failed to read unit tests: {}", tests_path.display()))?;
    let report = TestReport::load(report_path)
        .with_context(|| format!("failed to load test report: {}", report_path.display()))?;

    let code = match code_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read code: {}", path.display()))?,
        None => {
            let function = function.unwrap_or(&config.pipeline.target_function);
            let store = store::open_store(config, &credentials).await?;
            let embedder = create_embedder(&config.embedding, &credentials)
                .context("failed to create embedding provider")?;
            let retriever =
                Retriever::new(store.as_ref(), embedder.as_ref(), config.retrieval.mode);
            let hit = retriever
                .top(CODE_COLLECTION, function)
                .await
                .with_context(|| format!("retrieving code for {} failed", function))?;
            store.close().await;
            hit.content
        }
    };

    let orchestrator = Orchestrator::new(
        &model,
        config.generation.test_framework.clone(),
        config.generation.max_repair_attempts,
    );
    let suggestions = orchestrator
        .synthesize_feedback(&code, &unit_tests, &report.render())
        .await
        .context("feedback generation failed")?;

    let path = Artifacts::new(&config.pipeline.output_dir).write(FEEDBACK_FILE, &suggestions)?;

    println!("feedback");
    if let Some(s) = report.summary {
        println!(
            "  report: {} passed, {} failed, {} skipped",
            s.passed, s.failed, s.skipped
        );
    }
    println!("  suggestions: {}", path.display());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_report() {
        let report = TestReport::from_json(
            r#"{"summary":{"passed":3,"failed":3},
                "tests":[{"name":"valid_discount","outcome":"failed","message":"left: 80.0, right: 90.0"},
                         {"name":"square_area","outcome":"passed"}]}"#,
        )
        .unwrap();
        assert_eq!(
            report.summary,
            Some(ReportSummary {
                passed: 3,
                failed: 3,
                skipped: 0
            })
        );
        let rendered = report.render();
        assert!(rendered.starts_with("3 passed, 3 failed, 0 skipped"));
        assert!(rendered.contains("- valid_discount: failed (left: 80.0, right: 90.0)"));
        assert!(rendered.contains("- square_area: passed"));
    }

    #[test]
    fn test_malformed_json_is_report_error() {
        let err = TestReport::from_json("{\"tests\": []}").unwrap_err();
        assert!(matches!(err, Error::Report(_)));
    }

    #[test]
    fn test_markdown_counts() {
        let md = "# Test Report\n\n## Summary\n\n3 passed, 3 failed\n\n| test | outcome |\n";
        let report = TestReport::from_text(md).unwrap();
        let s = report.summary.unwrap();
        assert_eq!((s.passed, s.failed), (3, 3));
        assert_eq!(report.render(), md.trim_end());
    }

    #[test]
    fn test_cargo_output_counts_summed() {
        let out = "running 4 tests\n\
                   test tests::valid_discount ... FAILED\n\
                   test result: FAILED. 3 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out\n\
                   \n\
                   running 2 tests\n\
                   test result: FAILED. 0 passed; 2 failed; 1 ignored; 0 measured; 0 filtered out\n";
        let s = TestReport::from_text(out).unwrap().summary.unwrap();
        assert_eq!(
            s,
            ReportSummary {
                passed: 3,
                failed: 3,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_huge_counts_saturate() {
        let out = "test result: FAILED. 4294967295 passed; 1 failed\n\
                   test result: FAILED. 4294967295 passed; 4294967295 failed; 4294967295 ignored\n";
        let s = TestReport::from_text(out).unwrap().summary.unwrap();
        assert_eq!(s.passed, u32::MAX);
        assert_eq!(s.failed, u32::MAX);

        let line = line_counts("4294967295 skipped, 7 ignored").unwrap();
        assert_eq!(line.skipped, u32::MAX);
    }

    #[test]
    fn test_text_without_counts_is_kept() {
        let report = TestReport::from_text("everything exploded").unwrap();
        assert!(report.summary.is_none());
        assert_eq!(report.render(), "everything exploded");
        assert!(TestReport::from_text("  \n").is_err());
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let tmp = TempDir::new().unwrap();
        let json = tmp.path().join("report.JSON");
        std::fs::write(&json, r#"{"summary":{"passed":1,"failed":0}}"#).unwrap();
        assert!(TestReport::load(&json).unwrap().raw.is_empty());

        let md = tmp.path().join("report.md");
        std::fs::write(&md, "1 passed").unwrap();
        assert_eq!(TestReport::load(&md).unwrap().raw, "1 passed");

        let err = TestReport::load(&tmp.path().join("missing.md")).unwrap_err();
        assert!(matches!(err, Error::Report(_)));
    }
}
