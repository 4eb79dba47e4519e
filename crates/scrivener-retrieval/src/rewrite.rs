use std::sync::Arc;
use std::time::Duration;

use scrivener_core::traits::LlmService;
use scrivener_core::types::CompletionOptions;
use scrivener_core::{Error, Result};

const REWRITE_PROMPT: &str = "Rewrite the search query below into {n} alternative phrasings or sub-queries \
that would help find relevant passages in the user's documents. Return one per line, no numbering, no commentary.\n\nQuery: {query}";

/// LLM-backed paraphrasing for retrieval Stage C.
pub struct QueryRewriter {
    llm: Arc<dyn LlmService>,
    timeout: Duration,
    options: CompletionOptions,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LlmService>, timeout_ms: u64) -> Self {
        Self { llm, timeout: Duration::from_millis(timeout_ms), options: CompletionOptions { temperature: 0.3, max_tokens: 200 } }
    }

    pub async fn rewrite(&self, query: &str, max: usize) -> Result<Vec<String>> {
        let prompt = REWRITE_PROMPT.replace("{n}", &max.to_string()).replace("{query}", query);
        let text = tokio::time::timeout(self.timeout, self.llm.complete(&prompt, &self.options))
            .await
            .map_err(|_| Error::transient("llm", format!("query rewrite timed out after {}ms", self.timeout.as_millis())))??;
        let variants = parse_variants(&text, query, max);
        if variants.is_empty() { return Err(Error::operation("query rewrite returned no usable variants")); }
        Ok(variants)
    }
}

/// One variant per non-empty line, list markers and quotes stripped, original and duplicates dropped.
pub fn parse_variants(text: &str, original: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let v = line
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•'))
            .trim()
            .trim_matches('"')
            .trim();
        if v.is_empty() || v.eq_ignore_ascii_case(original.trim()) || out.iter().any(|o| o.eq_ignore_ascii_case(v)) { continue; }
        out.push(v.to_string());
        if out.len() >= max { break; }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_cleaned_and_bounded() {
        let text = "1. Q3 revenue figures\n2) \"third quarter results\"\n- Q3 revenue figures\n\nWhat were Q3 results?\n* quarterly earnings";
        let v = parse_variants(text, "What were Q3 results?", 3);
        assert_eq!(v, vec!["Q3 revenue figures", "third quarter results", "quarterly earnings"]);
        assert_eq!(parse_variants(text, "x", 1).len(), 1);
        assert!(parse_variants("   \n", "x", 3).is_empty());
    }
}
