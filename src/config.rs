//! Configuration types for the PDF → natural-language pipeline.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, serialise the option blocks for
//! logging, and diff two runs to understand why their outputs differ.
//!
//! Credentials are loaded exactly once, at construction time, via
//! [`Credentials::from_env`] or explicit setters — the library never reads
//! ambient environment state mid-pipeline.

use crate::error::Pdf2NlError;
use crate::pipeline::nlp::ConvertService;
use crate::pipeline::parse::ParseService;
use crate::progress::BatchProgressCallback;
use crate::select::TableHeuristic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the parsing-service key.
pub const PARSE_API_KEY_ENV: &str = "LLAMA_PARSE_API_KEY";
/// Environment variable holding the conversion-service key.
pub const CONVERT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Options forwarded to the parsing service with every upload.
///
/// Defaults mirror the service tier this pipeline was tuned against; every
/// field is a recognised knob of the remote API and is sent verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Parsing tier. Default: "agentic_plus".
    pub tier: String,
    /// Service version pin. Default: "latest".
    pub version: String,
    /// High-resolution OCR pass. Default: true.
    pub high_res_ocr: bool,
    /// Adaptive handling for tables spanning many pages. Default: true.
    pub adaptive_long_table: bool,
    /// Extract tables drawn with outlines rather than grid lines. Default: true.
    pub outlined_table_extraction: bool,
    /// Emit complex tables as HTML instead of GFM pipes. Default: true.
    pub output_tables_as_html: bool,
    /// Precise bounding boxes in the service's layout pass. Default: true.
    pub precise_bounding_box: bool,
    /// String inserted between pages in the returned markup.
    /// Default: "\n\n---\n\n".
    pub page_separator: String,
    /// Maximum pages to parse; 0 means unlimited. Default: 0.
    pub max_pages: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            tier: "agentic_plus".to_string(),
            version: "latest".to_string(),
            high_res_ocr: true,
            adaptive_long_table: true,
            outlined_table_extraction: true,
            output_tables_as_html: true,
            precise_bounding_box: true,
            page_separator: "\n\n---\n\n".to_string(),
            max_pages: 0,
        }
    }
}

/// Options for the conversion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Model identifier. Default: "claude-sonnet-4-20250514".
    pub model: String,
    /// Maximum tokens the model may generate. Default: 8000.
    ///
    /// Dense tabular documents produce long, enumerated output. Setting this
    /// too low silently truncates; the pipeline surfaces that via
    /// [`crate::output::ConversionResult::truncated`] rather than failing.
    pub max_tokens: u32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8000,
        }
    }
}

/// The two service secrets, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub parse_api_key: Option<String>,
    pub convert_api_key: Option<String>,
}

impl Credentials {
    /// Read both keys from the environment. Empty values count as absent.
    pub fn from_env() -> Self {
        let read = |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty());
        Self {
            parse_api_key: read(PARSE_API_KEY_ENV),
            convert_api_key: read(CONVERT_API_KEY_ENV),
        }
    }
}

/// Configuration for a pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2nl::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .parse_api_key("llx-...")
///     .convert_api_key("sk-ant-...")
///     .concurrent(true)
///     .max_in_flight(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Credentials for the two services. Either key may be omitted when the
    /// corresponding service is injected directly.
    pub credentials: Credentials,

    /// Parsing-service options sent with every upload.
    pub parse: ParseOptions,

    /// Conversion-service options.
    pub convert: ConvertOptions,

    /// Tunable table-detection heuristic for prompt selection.
    pub table_heuristic: TableHeuristic,

    /// Force the table prompt for every document. Mutually exclusive with
    /// `force_general_prompt`; `build()` rejects both being set.
    pub force_table_prompt: bool,

    /// Force the general prompt for every document.
    pub force_general_prompt: bool,

    /// Custom prompt template overriding both built-ins. See
    /// [`crate::prompts::render_prompt`] for placeholder handling.
    pub custom_prompt: Option<String>,

    /// Persist parsed markup under `markdown_dir`. Default: true.
    pub save_markdown: bool,

    /// Persist natural-language output under `natural_language_dir`. Default: true.
    pub save_natural_language: bool,

    /// Directory for markup artifacts. Default: "output/markdown".
    pub markdown_dir: PathBuf,

    /// Directory for natural-language artifacts. Default: "output/natural_language".
    pub natural_language_dir: PathBuf,

    /// Overlap the remote calls of independent documents. Default: false.
    ///
    /// Sequential mode finishes one document completely before starting the
    /// next — simplest to reason about, lowest throughput. Concurrent mode
    /// overlaps the network-bound parse/convert calls of up to
    /// `max_in_flight` documents.
    pub concurrent: bool,

    /// Maximum documents processed at once in concurrent mode. Default: 4.
    ///
    /// Unbounded concurrency on a large batch exhausts file descriptors and
    /// trips service rate limits; every in-flight document holds its PDF
    /// bytes and markup in memory.
    pub max_in_flight: usize,

    /// Overall batch deadline. On expiry, outstanding documents are cancelled
    /// and recorded as [`crate::error::DocumentError::Cancelled`];
    /// already-completed documents keep their results. Default: none.
    pub batch_timeout_secs: Option<u64>,

    /// Maximum retry attempts on a retryable service failure. Default: 3.
    ///
    /// Applies independently at the parse and convert boundaries. Auth and
    /// malformed-response errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, so concurrent workers
    /// don't stampede a recovering endpoint.
    pub retry_backoff_ms: u64,

    /// Per-HTTP-request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Pre-constructed parsing service. Takes precedence over the API key;
    /// useful in tests or for custom transports.
    pub parse_service: Option<Arc<dyn ParseService>>,

    /// Pre-constructed conversion service. Takes precedence over the API key.
    pub convert_service: Option<Arc<dyn ConvertService>>,

    /// Batch progress callback, driven from `process_batch`.
    pub progress: Option<Arc<dyn BatchProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            parse: ParseOptions::default(),
            convert: ConvertOptions::default(),
            table_heuristic: TableHeuristic::default(),
            force_table_prompt: false,
            force_general_prompt: false,
            custom_prompt: None,
            save_markdown: true,
            save_natural_language: true,
            markdown_dir: PathBuf::from("output/markdown"),
            natural_language_dir: PathBuf::from("output/natural_language"),
            concurrent: false,
            max_in_flight: 4,
            batch_timeout_secs: None,
            max_retries: 3,
            retry_backoff_ms: 500,
            request_timeout_secs: 120,
            parse_service: None,
            convert_service: None,
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("parse", &self.parse)
            .field("convert", &self.convert)
            .field("table_heuristic", &self.table_heuristic)
            .field("force_table_prompt", &self.force_table_prompt)
            .field("force_general_prompt", &self.force_general_prompt)
            .field("save_markdown", &self.save_markdown)
            .field("save_natural_language", &self.save_natural_language)
            .field("markdown_dir", &self.markdown_dir)
            .field("natural_language_dir", &self.natural_language_dir)
            .field("concurrent", &self.concurrent)
            .field("max_in_flight", &self.max_in_flight)
            .field("batch_timeout_secs", &self.batch_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field(
                "parse_service",
                &self.parse_service.as_ref().map(|_| "<dyn ParseService>"),
            )
            .field(
                "convert_service",
                &self.convert_service.as_ref().map(|_| "<dyn ConvertService>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The explicit prompt override, if either force flag is set.
    pub fn prompt_override(&self) -> Option<crate::select::PromptVariant> {
        if self.force_table_prompt {
            Some(crate::select::PromptVariant::Table)
        } else if self.force_general_prompt {
            Some(crate::select::PromptVariant::General)
        } else {
            None
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn credentials(mut self, creds: Credentials) -> Self {
        self.config.credentials = creds;
        self
    }

    pub fn parse_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.credentials.parse_api_key = Some(key.into());
        self
    }

    pub fn convert_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.credentials.convert_api_key = Some(key.into());
        self
    }

    pub fn parse_options(mut self, options: ParseOptions) -> Self {
        self.config.parse = options;
        self
    }

    pub fn convert_options(mut self, options: ConvertOptions) -> Self {
        self.config.convert = options;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.convert.model = model.into();
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.convert.max_tokens = n.max(1);
        self
    }

    pub fn table_heuristic(mut self, heuristic: TableHeuristic) -> Self {
        self.config.table_heuristic = heuristic;
        self
    }

    pub fn force_table_prompt(mut self, v: bool) -> Self {
        self.config.force_table_prompt = v;
        self
    }

    pub fn force_general_prompt(mut self, v: bool) -> Self {
        self.config.force_general_prompt = v;
        self
    }

    pub fn custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.custom_prompt = Some(prompt.into());
        self
    }

    pub fn save_markdown(mut self, v: bool) -> Self {
        self.config.save_markdown = v;
        self
    }

    pub fn save_natural_language(mut self, v: bool) -> Self {
        self.config.save_natural_language = v;
        self
    }

    pub fn markdown_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.markdown_dir = dir.into();
        self
    }

    pub fn natural_language_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.natural_language_dir = dir.into();
        self
    }

    pub fn concurrent(mut self, v: bool) -> Self {
        self.config.concurrent = v;
        self
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.max_in_flight = n.max(1);
        self
    }

    pub fn batch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.batch_timeout_secs = Some(secs);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn parse_service(mut self, service: Arc<dyn ParseService>) -> Self {
        self.config.parse_service = Some(service);
        self
    }

    pub fn convert_service(mut self, service: Arc<dyn ConvertService>) -> Self {
        self.config.convert_service = Some(service);
        self
    }

    pub fn progress(mut self, callback: Arc<dyn BatchProgressCallback>) -> Self {
        self.config.progress = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2NlError> {
        let c = &self.config;
        if c.force_table_prompt && c.force_general_prompt {
            return Err(Pdf2NlError::InvalidConfig(
                "force_table_prompt and force_general_prompt are mutually exclusive".into(),
            ));
        }
        if c.max_in_flight == 0 {
            return Err(Pdf2NlError::InvalidConfig("max_in_flight must be ≥ 1".into()));
        }
        if c.convert.max_tokens == 0 {
            return Err(Pdf2NlError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if !(0.0..=1.0).contains(&c.table_heuristic.threshold) {
            return Err(Pdf2NlError::InvalidConfig(format!(
                "table threshold must be within 0.0–1.0, got {}",
                c.table_heuristic.threshold
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::PromptVariant;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.parse.tier, "agentic_plus");
        assert_eq!(c.parse.page_separator, "\n\n---\n\n");
        assert_eq!(c.parse.max_pages, 0);
        assert_eq!(c.convert.model, "claude-sonnet-4-20250514");
        assert_eq!(c.convert.max_tokens, 8000);
        assert_eq!(c.max_in_flight, 4);
        assert!(!c.concurrent);
        assert!(c.save_markdown);
        assert!(c.save_natural_language);
    }

    #[test]
    fn both_force_flags_rejected() {
        let err = PipelineConfig::builder()
            .force_table_prompt(true)
            .force_general_prompt(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2NlError::InvalidConfig(_)));
    }

    #[test]
    fn prompt_override_mapping() {
        let table = PipelineConfig::builder()
            .force_table_prompt(true)
            .build()
            .unwrap();
        assert_eq!(table.prompt_override(), Some(PromptVariant::Table));

        let general = PipelineConfig::builder()
            .force_general_prompt(true)
            .build()
            .unwrap();
        assert_eq!(general.prompt_override(), Some(PromptVariant::General));

        let auto = PipelineConfig::builder().build().unwrap();
        assert_eq!(auto.prompt_override(), None);
    }

    #[test]
    fn max_in_flight_clamped_to_one() {
        let c = PipelineConfig::builder().max_in_flight(0).build().unwrap();
        assert_eq!(c.max_in_flight, 1);
    }

    #[test]
    fn bad_threshold_rejected() {
        let err = PipelineConfig::builder()
            .table_heuristic(crate::select::TableHeuristic {
                threshold: 2.0,
                extra_markers: Vec::new(),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2NlError::InvalidConfig(_)));
    }
}
