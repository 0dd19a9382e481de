//! Prompt context assembly from search results.

use std::collections::BTreeMap;

use crate::search::SearchResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Prefix each group with `[Document: D, Page: P]`.
    pub with_metadata: bool,
    /// Prefix each chunk with `(score=0.123)`.
    pub with_score: bool,
    pub separator: String,
}

impl Default for ContextOptions {
    fn default() -> Self { Self { with_metadata: true, with_score: false, separator: "\n\n---\n\n".to_string() } }
}

/// Merge results that share a `(document, page)` into one block.
///
/// Blocks are ordered by document, then page text; chunks inside a block keep
/// their ranking order.
pub fn format_context_grouped(results: &[SearchResult<'_>], opts: &ContextOptions) -> String {
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for r in results {
        let doc = r.meta.get("document").map_or_else(|| "unknown_doc".to_string(), ToString::to_string);
        let page = r.meta.get("page").map_or_else(|| "unknown_page".to_string(), ToString::to_string);
        let text = r.text.trim();
        let line = if opts.with_score { format!("(score={:.3}) {text}", r.score) } else { text.to_string() };
        groups.entry((doc, page)).or_default().push(line);
    }

    groups
        .into_iter()
        .map(|((doc, page), lines)| {
            let body = lines.join("\n");
            if opts.with_metadata {
                format!("[Document: {doc}, Page: {page}]\n{body}")
            } else {
                body
            }
        })
        .collect::<Vec<_>>()
        .join(&opts.separator)
}
