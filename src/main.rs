//! # testgen CLI
//!
//! ## Usage
//!
//! ```bash
//! testgen --config ./config/testgen.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `testgen init` | Create the requirements and code collections |
//! | `testgen index` | Chunk, embed, and store the built-in fixtures |
//! | `testgen search "<query>"` | Search one collection |
//! | `testgen generate` | Produce test cases and unit tests for a function |
//! | `testgen feedback` | Ask for fix suggestions given a test report |
//! | `testgen run` | init, index, generate, and (with `--report`) feedback |
//! | `testgen status` | Store readiness and chunk counts |
//!
//! Diagnostics go to stderr through `tracing` (`RUST_LOG`, default `warn`);
//! results go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rag_testgen::config::{self, SchemaPolicy, SearchMode};
use rag_testgen::search::CollectionKind;
use rag_testgen::{feedback, ingest, orchestrator, schema, search, stats};

/// Requirements-driven unit-test generation over a vector store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/testgen.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "testgen", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/testgen.toml")]
    config: PathBuf,

    /// Emit diagnostics as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the two collections.
    ///
    /// What happens to a collection that already exists is decided by
    /// `[schema] on_existing` or `--on-existing`.
    Init {
        /// `skip`, `recreate`, or `fail`.
        #[arg(long)]
        on_existing: Option<SchemaPolicy>,
    },

    /// Index the requirements document and the codebase.
    ///
    /// Re-running is safe: unchanged chunks are skipped.
    Index,

    /// Search a collection.
    Search {
        /// Free-text query.
        query: String,

        /// `code` or `requirements`.
        #[arg(long, default_value = "code")]
        collection: CollectionKind,

        /// `keyword` or `semantic`. Defaults to `[retrieval] mode`.
        #[arg(long)]
        mode: Option<SearchMode>,

        /// Maximum number of results. Defaults to `[retrieval] limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Generate test cases and unit tests for a function.
    Generate {
        /// Target function. Defaults to `[pipeline] target_function`.
        #[arg(long)]
        function: Option<String>,
    },

    /// Ask for fix suggestions given generated tests and a test report.
    Feedback {
        /// Generated unit tests.
        #[arg(long)]
        tests: PathBuf,

        /// Test report (`.json`, markdown, or captured runner output).
        #[arg(long)]
        report: PathBuf,

        /// Code under test. Defaults to the retrieved code chunk.
        #[arg(long)]
        code: Option<PathBuf>,

        /// Target function used to retrieve the code.
        #[arg(long)]
        function: Option<String>,
    },

    /// Run init, index, and generate; feedback too when `--report` is given.
    Run {
        #[arg(long)]
        function: Option<String>,

        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show store readiness and chunk counts.
    Status,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env may carry RUST_LOG, so it is loaded before the subscriber.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { on_existing } => {
            schema::run_init(&cfg, on_existing).await?;
        }
        Commands::Index => {
            ingest::run_index(&cfg).await?;
        }
        Commands::Search {
            query,
            collection,
            mode,
            limit,
        } => {
            search::run_search(&cfg, &query, collection, mode, limit).await?;
        }
        Commands::Generate { function } => {
            orchestrator::run_generate(&cfg, function.as_deref()).await?;
        }
        Commands::Feedback {
            tests,
            report,
            code,
            function,
        } => {
            feedback::run_feedback(&cfg, &tests, &report, code.as_deref(), function.as_deref())
                .await?;
        }
        Commands::Run { function, report } => {
            orchestrator::run_pipeline(&cfg, function.as_deref(), report.as_deref()).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
