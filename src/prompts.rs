//! Instruction templates for the conversion service.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing conversion behaviour (e.g. a new
//!    extraction rule) requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can render and inspect prompts directly
//!    without calling a real LLM, making prompt regressions easy to catch.
//!
//! Callers can bypass both templates with a custom prompt via
//! [`crate::config::PipelineConfig::custom_prompt`]; the constants here are
//! used only when no override is provided.

use crate::select::PromptVariant;

/// Placeholder replaced by the parsed markup when a template is rendered.
pub const MARKUP_PLACEHOLDER: &str = "{markup}";

/// Table-specialised prompt: exhaustive, cell-by-cell conversion of tabular
/// markup into retrieval-friendly prose. Used when [`PromptVariant::Table`]
/// is selected.
pub const TABLE_PROMPT: &str = r#"You are an expert at converting structured data (tables, charts, matrices) into natural-language text without losing information.

Convert the Markdown data below into structured text suitable for a Retrieval Augmented Generation (RAG) system. Work in phases:

1. DEFINE THE STRUCTURE
   - List every row heading, including nested category hierarchies
   - List every column heading, flattening multi-level headers explicitly
   - Explain every legend symbol (circle, cross, dash, check) and what it means
   - Name the kind of structure: table, list, flow, organisational chart

2. ENUMERATE EVERY CELL
   For each row/column intersection write:
   - the full row path (Category > Subcategory > Item)
   - the full column path (Condition > Detail)
   - the cell value, spelling out symbols; record empty cells and dashes too
   - any footnote that applies to the cell
   Never skip a cell, even when it is empty.

3. INTEGRATE FOOTNOTES
   For each footnote or annotation state its content, which items it applies
   to, and any conditions or exceptions it introduces.

4. SUMMARISE
   Describe what the data represents overall, the main rules and patterns,
   notable exceptions, and dependencies between items. Use bullet points,
   keep concrete keywords, and avoid vague phrasing.

5. VERIFY
   Before answering, re-check row/column coordinates, symbol transcription,
   and footnote attribution. Fix any mismatch you find.

Input data:

{markup}

Output the structured RAG text following the phases above."#;

/// General prompt for mostly-prose documents. Used when
/// [`PromptVariant::General`] is selected.
pub const GENERAL_PROMPT: &str = r#"Convert the Markdown data below into structured natural-language text optimised for a Retrieval Augmented Generation (RAG) system.

Requirements:
1. Completeness — do not drop any information from the source
2. Structure — keep headings, lists, and section hierarchy visible
3. Searchability — keep concrete keywords so passages are retrievable
4. Clarity — avoid vague phrasing; state things concretely
5. Bullet points — prefer detailed bullets over compressed summaries

Steps: classify what the document is (report, manual, policy, ...), extract
the key points, expand each with its details, state relations between items,
and fold in footnotes, exceptions, and conditions where they apply.

Input data:

{markup}

Output the structured RAG text following the requirements above."#;

/// Render the prompt for the given markup and variant.
///
/// When `custom` is provided it replaces the built-in template entirely; if
/// it contains [`MARKUP_PLACEHOLDER`] the markup is substituted in place,
/// otherwise the markup is appended after the custom text so the model always
/// sees the document.
pub fn render_prompt(markup: &str, variant: PromptVariant, custom: Option<&str>) -> String {
    match custom {
        Some(template) if template.contains(MARKUP_PLACEHOLDER) => {
            template.replace(MARKUP_PLACEHOLDER, markup)
        }
        Some(template) => format!("{template}\n\n{markup}"),
        None => {
            let template = match variant {
                PromptVariant::Table => TABLE_PROMPT,
                PromptVariant::General => GENERAL_PROMPT,
            };
            template.replace(MARKUP_PLACEHOLDER, markup)
        }
    }
}
