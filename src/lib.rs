//! # pdf2nl
//!
//! Convert PDF documents into retrieval-ready natural-language prose via two
//! external services: a document-parsing service that turns the PDF into
//! semi-structured markup, and an LLM conversion service that rewrites the
//! markup as flowing English sentences.
//!
//! ## Why this crate?
//!
//! Chunked-and-embedded raw PDF text retrieves poorly: tables shatter into
//! meaningless cell fragments and layout artifacts pollute the embedding
//! space. Converting each document to complete sentences — where every table
//! cell becomes a statement carrying its own row and column context — gives
//! a RAG index text that actually answers questions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Parse    upload to the parsing service, poll, fetch markup
//!  ├─ 2. Select   table-density heuristic picks the prompt variant
//!  ├─ 3. Convert  LLM rewrites the markup as natural-language prose
//!  └─ 4. Persist  <stem>.md and <stem>_nl.txt written atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2nl::{Pipeline, PipelineConfig, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys read from LLAMA_PARSE_API_KEY / ANTHROPIC_API_KEY
//!     let config = PipelineConfig::builder()
//!         .credentials(Credentials::from_env())
//!         .build()?;
//!     let pipeline = Pipeline::new(config)?;
//!
//!     let result = pipeline.process_single("document.pdf").await;
//!     match result.conversion {
//!         Some(c) => println!("{}", c.text),
//!         None => eprintln!("failed: {:?}", result.error),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Batches run sequentially by default; set `.concurrent(true)` and
//! `.max_in_flight(n)` on the builder to overlap the network-bound stages of
//! independent documents. Results always come back in input order, one per
//! input, with per-document failures recorded rather than raised.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2nl` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2nl = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod select;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConvertOptions, Credentials, ParseOptions, PipelineConfig, PipelineConfigBuilder,
    CONVERT_API_KEY_ENV, PARSE_API_KEY_ENV,
};
pub use error::{DocumentError, Pdf2NlError, ServiceError};
pub use output::{BatchSummary, ConversionResult, ParseResult, PipelineResult};
pub use pipeline::input::collect_documents;
pub use pipeline::nlp::{
    Completion, ConvertService, FragmentStream, HttpConvertClient, NaturalLanguageConverter,
};
pub use pipeline::parse::{DocumentParser, HttpParseClient, ParseService, ParsedDocument};
pub use pipeline::store::ArtifactStore;
pub use process::Pipeline;
pub use progress::{BatchProgressCallback, NoopProgress, ProgressCallback};
pub use select::{select_variant, PromptVariant, TableHeuristic};
