//! Streaming entry point: parse a document, then deliver the conversion as
//! an incremental fragment stream instead of one blocking completion.
//!
//! Useful when the caller renders output live (a terminal, a websocket) and
//! the converted document is long. The parse stage still runs to completion
//! first — the remote parser has no incremental interface — so only the
//! conversion latency is streamed away.

use crate::error::DocumentError;
use crate::output::display_name;
use crate::select::select_variant;
use std::path::Path;
use tracing::info;

pub use crate::pipeline::nlp::FragmentStream;

impl crate::process::Pipeline {
    /// Parse the document, pick a prompt variant, and return a stream of
    /// natural-language fragments as the conversion service produces them.
    ///
    /// Unlike [`process_single`](crate::Pipeline::process_single), failures
    /// are returned as `Err` directly — there is no result record to attach
    /// them to — and nothing is persisted; the caller owns the fragments.
    /// Fragment order matches the service's generation order, and a
    /// mid-stream failure surfaces as an `Err` item after which the stream
    /// is exhausted.
    pub async fn stream_document(&self, path: impl AsRef<Path>) -> Result<FragmentStream, DocumentError> {
        let path = path.as_ref();
        info!("Streaming conversion of {}", display_name(path));

        let parse = self.parser.parse(path).await?;
        let variant = select_variant(
            &parse.markup,
            self.config().prompt_override(),
            &self.config().table_heuristic,
        );
        self.converter.convert_stream(&parse.markup, variant).await
    }
}
