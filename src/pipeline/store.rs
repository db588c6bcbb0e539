//! Artifact persistence: write markup and natural-language outputs to disk.
//!
//! Both artifact kinds are written atomically (temp file + rename in the
//! destination directory) so a crash mid-write never leaves a partial file
//! that a downstream indexer could pick up. A write failure is reported as
//! [`DocumentError::Persist`] and never discards the in-memory result.

use crate::error::DocumentError;
use crate::output::ConversionResult;
use std::path::{Path, PathBuf};
use tracing::info;

/// Durable storage for pipeline artifacts.
///
/// Markup goes to `markdown_dir/<stem>.md`; natural-language text goes to
/// `natural_language_dir/<stem>_nl.txt` with a small metadata header so an
/// artifact is self-describing when inspected later.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    markdown_dir: PathBuf,
    natural_language_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(markdown_dir: impl Into<PathBuf>, natural_language_dir: impl Into<PathBuf>) -> Self {
        Self {
            markdown_dir: markdown_dir.into(),
            natural_language_dir: natural_language_dir.into(),
        }
    }

    /// Persist parsed markup for the document with the given file stem.
    pub async fn save_markup(&self, stem: &str, markup: &str) -> Result<PathBuf, DocumentError> {
        let path = self.markdown_dir.join(format!("{stem}.md"));
        write_atomic(&path, markup.as_bytes()).await?;
        info!("Saved markup to {}", path.display());
        Ok(path)
    }

    /// Persist natural-language output for the document with the given stem.
    pub async fn save_natural_language(
        &self,
        stem: &str,
        result: &ConversionResult,
    ) -> Result<PathBuf, DocumentError> {
        let path = self.natural_language_dir.join(format!("{stem}_nl.txt"));
        let content = format!(
            "# Model: {}\n# Prompt Variant: {}\n# Input Tokens: {}\n# Output Tokens: {}\n{}\n\n{}",
            result.model,
            result.prompt_variant.as_str(),
            result.input_tokens,
            result.output_tokens,
            if result.truncated {
                "# Truncated: output hit the token cap"
            } else {
                "# Truncated: no"
            },
            result.text,
        );
        write_atomic(&path, content.as_bytes()).await?;
        info!("Saved natural-language output to {}", path.display());
        Ok(path)
    }
}

/// Write to a temp file in the target directory, then rename into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    let persist_err = |detail: String| DocumentError::Persist {
        path: path.to_path_buf(),
        detail,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| persist_err(e.to_string()))?;
    }

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| persist_err(e.to_string()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| persist_err(e.to_string()))?;
    Ok(())
}
