//! Prompt-variant selection: decide between the table-oriented and the
//! general conversion prompt for a piece of parsed markup.
//!
//! Misclassification here silently degrades output quality without raising
//! any error, so the heuristic is deliberately boring and fully tunable:
//! count the fraction of markup lines that carry table structure and compare
//! it against an explicit threshold. No hidden constants, no state — the same
//! markup and override always produce the same variant.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which instruction template guides the conversion service.
///
/// Decided once per document run, either by [`select_variant`]'s heuristic or
/// by an explicit override; never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptVariant {
    /// Table-specialised prompt: exhaustive cell-by-cell extraction.
    Table,
    /// General prompt for mostly-prose documents.
    General,
}

impl PromptVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptVariant::Table => "table",
            PromptVariant::General => "general",
        }
    }
}

/// Tunable knobs for automatic table detection.
///
/// The built-in marker set covers what the parsing service actually emits:
/// GFM pipe rows (`| a | b |`), their delimiter rows, and raw HTML table tags
/// (the parser outputs complex tables as HTML). `extra_markers` extends the
/// set with plain substrings for domain-specific vocabularies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableHeuristic {
    /// Minimum fraction of non-empty lines that must look table-structural
    /// for the Table variant to be chosen. Default: 0.05.
    ///
    /// A handful of pipe characters in a 300-line report should not flip the
    /// whole document to the table prompt; 5% means a real tabular block.
    pub threshold: f32,

    /// Additional substrings that mark a line as table-structural.
    pub extra_markers: Vec<String>,
}

impl Default for TableHeuristic {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            extra_markers: Vec::new(),
        }
    }
}

// A GFM table row has at least two pipes with content between them; this also
// matches delimiter rows like `| --- | --- |`.
static PIPE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|.*\|").expect("valid regex"));

static HTML_TABLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*(table|tr|td|th)\b").expect("valid regex"));

/// Choose the prompt variant for the given markup.
///
/// An explicit `override_variant` always wins, regardless of content.
/// Otherwise the table-marker line density is measured against
/// `heuristic.threshold`. Pure function of its inputs.
pub fn select_variant(
    markup: &str,
    override_variant: Option<PromptVariant>,
    heuristic: &TableHeuristic,
) -> PromptVariant {
    if let Some(forced) = override_variant {
        return forced;
    }

    if table_marker_density(markup, heuristic) >= heuristic.threshold {
        PromptVariant::Table
    } else {
        PromptVariant::General
    }
}

/// Fraction of non-empty lines that carry a table marker. Returns 0.0 for
/// empty markup.
pub fn table_marker_density(markup: &str, heuristic: &TableHeuristic) -> f32 {
    let mut total = 0usize;
    let mut marked = 0usize;

    for line in markup.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        total += 1;
        if is_table_line(line, heuristic) {
            marked += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        marked as f32 / total as f32
    }
}

fn is_table_line(line: &str, heuristic: &TableHeuristic) -> bool {
    PIPE_ROW.is_match(line)
        || HTML_TABLE_TAG.is_match(line)
        || heuristic.extra_markers.iter().any(|m| line.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "# Report\n\nThis quarter went well.\n\nRevenue grew steadily\nacross all regions.\n";

    const TABLED: &str = "# Pricing\n\n| Plan | Price |\n| --- | --- |\n| Basic | $10 |\n| Pro | $25 |\n";

    #[test]
    fn prose_selects_general() {
        let h = TableHeuristic::default();
        assert_eq!(select_variant(PROSE, None, &h), PromptVariant::General);
    }

    #[test]
    fn dense_table_selects_table() {
        let h = TableHeuristic::default();
        assert_eq!(select_variant(TABLED, None, &h), PromptVariant::Table);
    }

    #[test]
    fn html_tables_count_as_markers() {
        let h = TableHeuristic::default();
        let markup = "<table>\n<tr><td>a</td></tr>\n</table>\n";
        assert_eq!(select_variant(markup, None, &h), PromptVariant::Table);
    }

    #[test]
    fn override_always_wins() {
        let h = TableHeuristic::default();
        assert_eq!(
            select_variant(PROSE, Some(PromptVariant::Table), &h),
            PromptVariant::Table
        );
        assert_eq!(
            select_variant(TABLED, Some(PromptVariant::General), &h),
            PromptVariant::General
        );
    }

    #[test]
    fn selection_is_deterministic() {
        let h = TableHeuristic::default();
        let first = select_variant(TABLED, None, &h);
        for _ in 0..10 {
            assert_eq!(select_variant(TABLED, None, &h), first);
        }
    }

    #[test]
    fn empty_markup_is_general() {
        let h = TableHeuristic::default();
        assert_eq!(select_variant("", None, &h), PromptVariant::General);
        assert_eq!(table_marker_density("", &h), 0.0);
    }

    #[test]
    fn threshold_is_tunable() {
        // One pipe row in twenty prose lines: below the default threshold of
        // 0.05? 1/21 ≈ 0.048 — General by default, Table when lowered.
        let mut markup = String::from("| a | b |\n");
        for i in 0..20 {
            markup.push_str(&format!("prose line {i}\n"));
        }
        let default = TableHeuristic::default();
        assert_eq!(select_variant(&markup, None, &default), PromptVariant::General);

        let loose = TableHeuristic {
            threshold: 0.01,
            extra_markers: Vec::new(),
        };
        assert_eq!(select_variant(&markup, None, &loose), PromptVariant::Table);
    }

    #[test]
    fn extra_markers_extend_the_set() {
        let h = TableHeuristic {
            threshold: 0.3,
            extra_markers: vec!["CELL:".to_string()],
        };
        let markup = "CELL: a1\nCELL: a2\nprose\n";
        assert_eq!(select_variant(markup, None, &h), PromptVariant::Table);
    }
}
