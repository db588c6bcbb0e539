//! The pipeline orchestrator: per-document stage sequencing and batch
//! scheduling.
//!
//! ## Error convention
//!
//! `process_single` and `process_batch` share one convention: per-document
//! failures are **recorded in the returned [`PipelineResult`], never raised**.
//! The only fallible operation is constructing the [`Pipeline`] itself, which
//! fails fast on missing credentials or invalid configuration before any
//! network call. This keeps the single-document and batch APIs consistent —
//! there is no call site where the same failure is sometimes an `Err` and
//! sometimes a result field.
//!
//! ## Scheduling
//!
//! Sequential mode runs one document's full pipeline before starting the
//! next. Concurrent mode overlaps the network-bound parse/convert calls of
//! up to `max_in_flight` documents; results land in a pre-sized slot vector
//! indexed by input position, so the output order is deterministic no matter
//! which document's remote calls finish first. An optional batch timeout
//! cancels outstanding work, stamping unfinished slots as cancelled while
//! completed slots keep their results.

use crate::config::{PipelineConfig, CONVERT_API_KEY_ENV, PARSE_API_KEY_ENV};
use crate::error::{DocumentError, Pdf2NlError};
use crate::output::{display_name, PipelineResult};
use crate::pipeline::nlp::{ConvertService, HttpConvertClient, NaturalLanguageConverter};
use crate::pipeline::parse::{DocumentParser, HttpParseClient, ParseService};
use crate::pipeline::store::ArtifactStore;
use crate::select::select_variant;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// The document-processing pipeline.
///
/// Construct once with [`Pipeline::new`], then process any number of
/// documents; the instance is cheap to share behind an `Arc` and safe to use
/// from concurrent tasks.
pub struct Pipeline {
    config: PipelineConfig,
    pub(crate) parser: DocumentParser,
    pub(crate) converter: NaturalLanguageConverter,
    store: ArtifactStore,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build the pipeline, validating that each service has either an
    /// injected implementation or a credential. Fails before any remote call.
    pub fn new(config: PipelineConfig) -> Result<Self, Pdf2NlError> {
        let parse_service: Arc<dyn ParseService> =
            match (&config.parse_service, &config.credentials.parse_api_key) {
                (Some(service), _) => Arc::clone(service),
                (None, Some(key)) => Arc::new(HttpParseClient::new(
                    key.clone(),
                    config.request_timeout_secs,
                )),
                (None, None) => {
                    return Err(Pdf2NlError::MissingCredential {
                        service: "parsing",
                        env_var: PARSE_API_KEY_ENV,
                    })
                }
            };

        let convert_service: Arc<dyn ConvertService> =
            match (&config.convert_service, &config.credentials.convert_api_key) {
                (Some(service), _) => Arc::clone(service),
                (None, Some(key)) => Arc::new(HttpConvertClient::new(
                    key.clone(),
                    config.request_timeout_secs,
                )),
                (None, None) => {
                    return Err(Pdf2NlError::MissingCredential {
                        service: "conversion",
                        env_var: CONVERT_API_KEY_ENV,
                    })
                }
            };

        let parser = DocumentParser::new(
            parse_service,
            config.parse.clone(),
            config.max_retries,
            config.retry_backoff_ms,
        );
        let converter = NaturalLanguageConverter::new(
            convert_service,
            config.convert.clone(),
            config.custom_prompt.clone(),
            config.max_retries,
            config.retry_backoff_ms,
        );
        let store = ArtifactStore::new(
            config.markdown_dir.clone(),
            config.natural_language_dir.clone(),
        );

        Ok(Self {
            config,
            parser,
            converter,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one document through parse → select → convert → persist.
    ///
    /// Stage failures short-circuit the remaining stages and are recorded in
    /// the result; see the module docs for the error convention.
    pub async fn process_single(&self, path: impl AsRef<Path>) -> PipelineResult {
        let path = path.as_ref();
        let started = Instant::now();
        info!("Processing {}", path.display());

        let mut result = PipelineResult {
            document: display_name(path),
            path: path.to_path_buf(),
            parse: None,
            variant: None,
            conversion: None,
            error: None,
            persist_error: None,
            markup_path: None,
            text_path: None,
            duration_ms: 0,
        };

        // ── Stage 1: parse ───────────────────────────────────────────────
        let parse = match self.parser.parse(path).await {
            Ok(p) => p,
            Err(e) => {
                warn!("{}: parse stage failed — {e}", result.document);
                result.error = Some(e);
                result.duration_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.document.clone());

        // Markup is persisted before conversion so it survives a conversion
        // failure.
        if self.config.save_markdown {
            match self.store.save_markup(&stem, &parse.markup).await {
                Ok(p) => result.markup_path = Some(p),
                Err(e) => {
                    warn!("{}: markup write failed — {e}", result.document);
                    result.persist_error = Some(e);
                }
            }
        }

        // ── Stage 2: select the prompt variant ───────────────────────────
        let variant = select_variant(
            &parse.markup,
            self.config.prompt_override(),
            &self.config.table_heuristic,
        );
        debug!("{}: selected {} prompt", result.document, variant.as_str());
        result.variant = Some(variant);

        // ── Stage 3: convert ─────────────────────────────────────────────
        match self.converter.convert(&parse.markup, variant).await {
            Ok(conversion) => {
                // ── Stage 4: persist ─────────────────────────────────────
                if self.config.save_natural_language {
                    match self.store.save_natural_language(&stem, &conversion).await {
                        Ok(p) => result.text_path = Some(p),
                        Err(e) => {
                            warn!("{}: artifact write failed — {e}", result.document);
                            result.persist_error = Some(e);
                        }
                    }
                }
                result.conversion = Some(conversion);
            }
            Err(e) => {
                warn!("{}: convert stage failed — {e}", result.document);
                result.error = Some(e);
            }
        }

        result.parse = Some(parse);
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "{}: {} in {}ms",
            result.document,
            if result.is_success() { "done" } else { "failed" },
            result.duration_ms
        );
        result
    }

    /// Process a batch: exactly one result per input path, in input order,
    /// with per-document failures isolated from each other.
    pub async fn process_batch(&self, paths: &[PathBuf]) -> Vec<PipelineResult> {
        let total = paths.len();
        info!(
            "Processing batch of {total} document(s) ({} mode)",
            if self.config.concurrent {
                "concurrent"
            } else {
                "sequential"
            }
        );
        if let Some(ref cb) = self.config.progress {
            cb.on_batch_start(total);
        }

        let results = if self.config.concurrent {
            self.process_batch_concurrent(paths).await
        } else {
            self.process_batch_sequential(paths).await
        };

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!("Batch complete: {succeeded}/{total} succeeded");
        if let Some(ref cb) = self.config.progress {
            cb.on_batch_complete(total, succeeded);
        }
        results
    }

    async fn process_batch_sequential(&self, paths: &[PathBuf]) -> Vec<PipelineResult> {
        let total = paths.len();
        let deadline = self
            .config
            .batch_timeout_secs
            .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

        let mut results = Vec::with_capacity(total);
        for (index, path) in paths.iter().enumerate() {
            if let Some(ref cb) = self.config.progress {
                cb.on_document_start(index, total, &display_name(path));
            }

            let result = match deadline {
                Some(d) => match tokio::time::timeout_at(d, self.process_single(path)).await {
                    Ok(r) => r,
                    Err(_) => {
                        warn!("Batch timeout expired at document {index}");
                        PipelineResult::failed(path, DocumentError::Cancelled)
                    }
                },
                None => self.process_single(path).await,
            };

            if let Some(ref cb) = self.config.progress {
                cb.on_document_complete(index, total, &result.document, result.is_success());
            }
            results.push(result);
        }
        results
    }

    async fn process_batch_concurrent(&self, paths: &[PathBuf]) -> Vec<PipelineResult> {
        let total = paths.len();
        // Pre-sized slot vector indexed by input position: tasks complete in
        // arbitrary order but each writes only its own slot, so the final
        // sequence is deterministic.
        let slots: Mutex<Vec<Option<PipelineResult>>> = Mutex::new((0..total).map(|_| None).collect());

        let work = futures::stream::iter(paths.iter().enumerate()).for_each_concurrent(
            self.config.max_in_flight,
            |(index, path)| {
                let slots = &slots;
                async move {
                    if let Some(ref cb) = self.config.progress {
                        cb.on_document_start(index, total, &display_name(path));
                    }
                    let result = self.process_single(path).await;
                    if let Some(ref cb) = self.config.progress {
                        cb.on_document_complete(index, total, &result.document, result.is_success());
                    }
                    slots.lock().expect("slot mutex poisoned")[index] = Some(result);
                }
            },
        );

        match self.config.batch_timeout_secs {
            Some(secs) => {
                if tokio::time::timeout(Duration::from_secs(secs), work)
                    .await
                    .is_err()
                {
                    warn!("Batch timeout of {secs}s expired; cancelling outstanding documents");
                }
            }
            None => work.await,
        }

        slots
            .into_inner()
            .expect("slot mutex poisoned")
            .into_iter()
            .zip(paths)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| PipelineResult::failed(path, DocumentError::Cancelled))
            })
            .collect()
    }
}
