//! Generation stages and the artifacts they produce.
//!
//! ```text
//! retrieve code + requirements ──► stage 1: test-case table
//!                                        │
//!                                        ▼
//!                                  stage 2: unit tests ──► validate ──► repair? ──► generated_tests.rs
//!
//! code + unit tests + test report ──► stage 3: feedback ──► feedback.md
//! ```
//!
//! Each stage is one request/response turn against a [`ChatModel`]; the
//! text of one stage is interpolated into the next stage's prompt.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{Config, Credentials};
use crate::embedding::create_embedder;
use crate::error::{Error, Result};
use crate::llm::{ChatModel, OpenAiChat};
use crate::models::SearchHit;
use crate::prompt;
use crate::schema::{CODE_COLLECTION, REQUIREMENTS_COLLECTION};
use crate::search::Retriever;
use crate::store;
use crate::validate::{validate_rust_tests, ValidatedTests};

pub const TEST_CASES_FILE: &str = "test_cases.md";
pub const UNIT_TESTS_FILE: &str = "generated_tests.rs";
pub const FEEDBACK_FILE: &str = "feedback.md";

/// The code chunk and requirements chunk that describe one function.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub function: String,
    pub code: SearchHit,
    pub requirements: SearchHit,
}

impl RetrievedContext {
    /// Top code hit and top requirements hit for `function`.
    pub async fn retrieve(retriever: &Retriever<'_>, function: &str) -> Result<Self> {
        let code = retriever.top(CODE_COLLECTION, function).await?;
        let requirements = retriever.top(REQUIREMENTS_COLLECTION, function).await?;
        Ok(Self {
            function: function.to_string(),
            code,
            requirements,
        })
    }
}

/// Output of stages 1 and 2.
#[derive(Debug, Clone)]
pub struct GeneratedTests {
    pub test_cases: String,
    pub unit_tests: ValidatedTests,
    /// Stage 2 requests made, including the first.
    pub attempts: u32,
}

pub struct Orchestrator<'a> {
    model: &'a dyn ChatModel,
    framework: String,
    max_repair_attempts: u32,
}

impl<'a> Orchestrator<'a> {
    pub fn new(model: &'a dyn ChatModel, framework: impl Into<String>, max_repair_attempts: u32) -> Self {
        Self {
            model,
            framework: framework.into(),
            max_repair_attempts,
        }
    }

    pub async fn synthesize_test_cases(&self, context: &RetrievedContext) -> Result<String> {
        let messages = prompt::test_case_messages(
            &context.function,
            &context.code.content,
            &context.requirements.content,
        );
        let result = self.model.chat(&messages).await?;
        tracing::info!(
            stage = "test_cases",
            model = %result.model,
            prompt_tokens = ?result.prompt_tokens,
            completion_tokens = ?result.completion_tokens,
            "generation done"
        );
        Ok(result.text)
    }

    /// Stage 2 with validation. Returns the validated tests and the number
    /// of requests it took.
    pub async fn synthesize_unit_tests(
        &self,
        context: &RetrievedContext,
        test_cases: &str,
    ) -> Result<(ValidatedTests, u32)> {
        let original = prompt::unit_test_messages(
            &context.function,
            test_cases,
            &context.requirements.content,
            &self.framework,
        );
        let mut messages = original.clone();
        let max_attempts = self.max_repair_attempts + 1;
        let mut attempt = 1;

        loop {
            let result = self.model.chat(&messages).await?;
            match validate_rust_tests(&result.text) {
                Ok(validated) => {
                    tracing::info!(
                        stage = "unit_tests",
                        attempt,
                        tests = validated.test_fns.len(),
                        "generation done"
                    );
                    return Ok((validated, attempt));
                }
                Err(reason) if attempt < max_attempts => {
                    tracing::warn!(attempt, %reason, "generated tests rejected, re-prompting");
                    messages = prompt::repair_messages(&original, &result.text, &reason);
                    attempt += 1;
                }
                Err(reason) => {
                    return Err(Error::InvalidOutput {
                        attempts: attempt,
                        reason,
                    });
                }
            }
        }
    }

    pub async fn generate(&self, context: &RetrievedContext) -> Result<GeneratedTests> {
        let test_cases = self.synthesize_test_cases(context).await?;
        let (unit_tests, attempts) = self.synthesize_unit_tests(context, &test_cases).await?;
        Ok(GeneratedTests {
            test_cases,
            unit_tests,
            attempts,
        })
    }

    pub async fn synthesize_feedback(&self, code: &str, unit_tests: &str, report: &str) -> Result<String> {
        let messages = prompt::feedback_messages(code, unit_tests, report);
        let result = self.model.chat(&messages).await?;
        tracing::info!(stage = "feedback", model = %result.model, "generation done");
        Ok(result.text)
    }
}

/// Files written under `pipeline.output_dir`.
#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn write(&self, file: &str, content: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(file);
        let mut body = content.trim_end().to_string();
        body.push('\n');
        std::fs::write(&path, body)?;
        tracing::debug!(path = %path.display(), "artifact written");
        Ok(path)
    }

    pub fn write_generated(&self, generated: &GeneratedTests) -> Result<(PathBuf, PathBuf)> {
        let cases = self.write(TEST_CASES_FILE, &generated.test_cases)?;
        let tests = self.write(UNIT_TESTS_FILE, &generated.unit_tests.source)?;
        Ok((cases, tests))
    }
}

/// `testgen generate`
pub async fn run_generate(config: &Config, function: Option<&str>) -> anyhow::Result<()> {
    let function = function.unwrap_or(&config.pipeline.target_function);
    let credentials = Credentials::from_env(config);
    let model = OpenAiChat::new(&config.generation, &credentials)
        .context("failed to create chat model")?;
    let store = store::open_store(config, &credentials).await?;
    let embedder = create_embedder(&config.embedding, &credentials)
        .context("failed to create embedding provider")?;

    let retriever = Retriever::new(store.as_ref(), embedder.as_ref(), config.retrieval.mode);
    let context = RetrievedContext::retrieve(&retriever, function)
        .await
        .with_context(|| format!("retrieving context for {} failed", function))?;

    let orchestrator = Orchestrator::new(
        &model,
        config.generation.test_framework.clone(),
        config.generation.max_repair_attempts,
    );
    let generated = orchestrator
        .generate(&context)
        .await
        .with_context(|| format!("generating tests for {} failed", function))?;

    let artifacts = Artifacts::new(&config.pipeline.output_dir);
    let (cases_path, tests_path) = artifacts.write_generated(&generated)?;

    println!("generate {}", function);
    println!(
        "  context: {} ({}), {} ({})",
        CODE_COLLECTION, context.code.filepath, REQUIREMENTS_COLLECTION, context.requirements.filepath
    );
    println!("  test cases: {}", cases_path.display());
    println!(
        "  unit tests: {} ({} tests, {} attempt(s))",
        tests_path.display(),
        generated.unit_tests.test_fns.len(),
        generated.attempts
    );
    println!("ok");

    store.close().await;
    Ok(())
}

/// Path of the generated unit tests for a config.
pub fn unit_tests_path(config: &Config) -> PathBuf {
    Artifacts::new(&config.pipeline.output_dir).path(UNIT_TESTS_FILE)
}

/// `testgen run`
pub async fn run_pipeline(
    config: &Config,
    function: Option<&str>,
    report: Option<&Path>,
) -> anyhow::Result<()> {
    crate::schema::run_init(config, None).await?;
    crate::ingest::run_index(config).await?;
    run_generate(config, function).await?;

    match report {
        Some(report) => {
            let tests = unit_tests_path(config);
            crate::feedback::run_feedback(config, &tests, report, None, function).await?;
        }
        None => tracing::info!("no test report given, feedback stage skipped"),
    }
    Ok(())
}
