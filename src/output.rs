//! Output types: per-stage results, the per-document pipeline result, and
//! batch-level aggregation.
//!
//! Everything here is `Serialize` so the CLI's `--json` mode and structured
//! logging can dump results without bespoke formatting code.

use crate::error::DocumentError;
use crate::select::PromptVariant;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the parsing service produced for one document.
///
/// Produced once per document and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    /// Semi-structured markup (Markdown, possibly with HTML tables), with the
    /// configured page separator between pages.
    pub markup: String,
    /// Number of pages the service reported.
    pub page_count: usize,
}

/// What the conversion service produced for one (markup, variant) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    /// The natural-language text.
    pub text: String,
    /// Model identifier that produced the text.
    pub model: String,
    /// Prompt variant the conversion ran with.
    pub prompt_variant: PromptVariant,
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens generated in the response.
    pub output_tokens: u64,
    /// True when the response hit the output-token cap and may be incomplete.
    /// Not a failure — the text is still returned — but callers that need
    /// completeness should re-run with a higher `max_tokens`.
    pub truncated: bool,
    /// Retries that were needed before the call succeeded.
    pub retries: u32,
}

/// The outcome of running one document through the pipeline.
///
/// Exactly one of these exists per input document per run. Invariants:
///
/// * `conversion.is_some()` implies `parse.is_some()` — a conversion never
///   exists without the parse that fed it.
/// * `error` and `conversion` are mutually exclusive. Artifact-write failures
///   go in `persist_error` instead, because a failed write must not discard
///   an already-computed conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Display name of the document (file name).
    pub document: String,
    /// Path the document was read from.
    pub path: PathBuf,
    /// Parse output; `None` when the parse stage failed.
    pub parse: Option<ParseResult>,
    /// The variant that was (or would have been) used for conversion.
    pub variant: Option<PromptVariant>,
    /// Conversion output; `None` on conversion failure or earlier.
    pub conversion: Option<ConversionResult>,
    /// The stage error that stopped this document, if any.
    pub error: Option<DocumentError>,
    /// Artifact-write failure, recorded separately from `error` so the
    /// in-memory result survives.
    pub persist_error: Option<DocumentError>,
    /// Where the markup artifact was written, when saving was enabled.
    pub markup_path: Option<PathBuf>,
    /// Where the natural-language artifact was written, when saving was enabled.
    pub text_path: Option<PathBuf>,
    /// Wall-clock time spent on this document.
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Whether the document made it through parse and convert.
    ///
    /// A persistence failure does not count as a pipeline failure here; check
    /// [`PipelineResult::persist_error`] separately if durability matters.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn failed(path: &std::path::Path, error: DocumentError) -> Self {
        Self {
            document: display_name(path),
            path: path.to_path_buf(),
            parse: None,
            variant: None,
            conversion: None,
            error: Some(error),
            persist_error: None,
            markup_path: None,
            text_path: None,
            duration_ms: 0,
        }
    }
}

pub(crate) fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Aggregate counters over a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Documents whose conversion succeeded but whose artifact write failed.
    pub persist_failures: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_pages: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[PipelineResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for r in results {
            if r.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if r.persist_error.is_some() {
                summary.persist_failures += 1;
            }
            if let Some(ref p) = r.parse {
                summary.total_pages += p.page_count;
            }
            if let Some(ref c) = r.conversion {
                summary.total_input_tokens += c.input_tokens;
                summary.total_output_tokens += c.output_tokens;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::path::Path;

    fn ok_result(name: &str) -> PipelineResult {
        PipelineResult {
            document: name.to_string(),
            path: PathBuf::from(name),
            parse: Some(ParseResult {
                markup: "# hi".into(),
                page_count: 2,
            }),
            variant: Some(PromptVariant::General),
            conversion: Some(ConversionResult {
                text: "hello".into(),
                model: "m".into(),
                prompt_variant: PromptVariant::General,
                input_tokens: 100,
                output_tokens: 50,
                truncated: false,
                retries: 0,
            }),
            error: None,
            persist_error: None,
            markup_path: None,
            text_path: None,
            duration_ms: 10,
        }
    }

    #[test]
    fn summary_aggregates_tokens_and_counts() {
        let failed = PipelineResult::failed(
            Path::new("bad.pdf"),
            DocumentError::Parse {
                attempts: 1,
                source: ServiceError::Timeout { elapsed_ms: 1 },
            },
        );
        let results = vec![ok_result("a.pdf"), failed, ok_result("b.pdf")];
        let s = BatchSummary::from_results(&results);
        assert_eq!(s.total, 3);
        assert_eq!(s.succeeded, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.total_input_tokens, 200);
        assert_eq!(s.total_output_tokens, 100);
        assert_eq!(s.total_pages, 4);
    }

    #[test]
    fn failed_result_has_no_stage_output() {
        let r = PipelineResult::failed(
            Path::new("x.pdf"),
            DocumentError::Cancelled,
        );
        assert!(!r.is_success());
        assert!(r.parse.is_none());
        assert!(r.conversion.is_none());
        assert_eq!(r.document, "x.pdf");
    }

    #[test]
    fn results_serialise_to_json() {
        let r = ok_result("a.pdf");
        let json = serde_json::to_string(&r).expect("serialisable");
        assert!(json.contains("\"document\":\"a.pdf\""));
    }
}
