//! Plain-text context block for prompt injection.
//!
//! Results are grouped per document (documents in rank order, chunks in
//! reading order), each group labeled once with the document title. Chunk
//! ids never appear in the output.

use scrivener_core::types::SearchResult;

const SEPARATOR: &str = "\n\n";

pub fn format_context(results: &[SearchResult], char_budget: usize) -> String {
    let mut groups: Vec<(&str, &str, Vec<&SearchResult>)> = Vec::new();
    for r in results {
        match groups.iter_mut().find(|(doc, _, _)| *doc == r.document_id) {
            Some((_, _, chunks)) => chunks.push(r),
            None => groups.push((&r.document_id, &r.document_title, vec![r])),
        }
    }

    let mut out = String::new();
    let mut used = 0usize;
    'groups: for (n, (_, title, mut chunks)) in groups.into_iter().enumerate() {
        chunks.sort_by_key(|c| c.chunk_index);
        let header = format!("[{}] {}\n", n + 1, title);
        let mut wrote_header = false;
        for chunk in chunks {
            let body = chunk.content.trim();
            let lead = if wrote_header { SEPARATOR.len() } else { header.chars().count() + if out.is_empty() { 0 } else { SEPARATOR.len() } };
            let needed = lead + body.chars().count();
            if used + needed > char_budget {
                // Only the very first passage is cut to fit; later ones are dropped whole.
                if out.is_empty() && char_budget > lead {
                    out.push_str(&header);
                    out.extend(body.chars().take(char_budget - lead));
                }
                break 'groups;
            }
            if wrote_header {
                out.push_str(SEPARATOR);
            } else {
                if !out.is_empty() { out.push_str(SEPARATOR); }
                out.push_str(&header);
                wrote_header = true;
            }
            out.push_str(body);
            used += needed;
        }
    }
    out
}
