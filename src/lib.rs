//! # testgen
//!
//! Requirements-driven unit-test generation over a vector store.
//!
//! A requirements document and a small codebase are chunked and indexed into
//! two collections. For a target function, the best-matching code chunk and
//! requirements chunk are retrieved by keyword search and handed to a chat
//! model twice: first for a markdown table of test cases, then for Rust unit
//! tests built from that table. Given a test report, a third turn asks the
//! model for fix suggestions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Fixtures │──▶│   Indexer    │──▶│ VectorStore  │
//! │ SRS+code │   │ Chunk+Embed  │   │ SQLite/Weav. │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                                   ┌──────▼───────┐   ┌───────────┐
//!                                   │  Retriever   │──▶│Orchestrat.│──▶ out/
//!                                   └──────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! testgen init                  # create both collections
//! testgen index                 # chunk and store the fixtures
//! testgen search calculate_discounted_price --collection code
//! testgen generate              # test cases + unit tests into ./out
//! testgen feedback --tests out/generated_tests.rs --report report.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`error`] | Error taxonomy |
//! | [`http`] | Timeouts and retry for outbound calls |
//! | [`models`] | Core data types |
//! | [`fixtures`] | Built-in requirements and code documents |
//! | [`sample`] | The sample functions under test |
//! | [`chunk`] | Overlapping fixed-size chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Collection storage (SQLite, Weaviate) |
//! | [`schema`] | Collection schemas and initialization |
//! | [`ingest`] | Indexing pipeline |
//! | [`search`] | Keyword and semantic retrieval |
//! | [`llm`] | Chat-completion client |
//! | [`prompt`] | Stage prompts |
//! | [`validate`] | Checks on generated test code |
//! | [`orchestrator`] | Generation stages and artifacts |
//! | [`feedback`] | Test reports and the feedback stage |
//! | [`stats`] | Store status |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod fixtures;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod sample;
pub mod schema;
pub mod search;
pub mod stats;
pub mod store;
pub mod validate;
