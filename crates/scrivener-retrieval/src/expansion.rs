//! Local, template-based query expansion.
//!
//! Produces paraphrases of the query without a model call: the keyword core
//! of the question plus a few HyDE-style phrasings that read more like the
//! passage we hope to find.

const QUESTION_WORDS: &[&str] = &[
    "what", "which", "who", "whom", "when", "where", "why", "how", "is", "are", "was", "were", "do", "does", "did",
    "can", "could", "should", "would", "tell", "me", "about", "the", "a", "an", "of", "my", "our", "please", "show", "find",
];

/// The query with question scaffolding removed: "What were Q3 results?" -> "Q3 results".
pub fn keyword_core(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !QUESTION_WORDS.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Up to `max` distinct variants, never including the query itself.
pub fn expand_query(query: &str, max: usize) -> Vec<String> {
    let core = keyword_core(query);
    if core.is_empty() { return Vec::new(); }
    let lower = query.trim().to_lowercase();
    let mut candidates = vec![core.clone()];
    if lower.starts_with("how") {
        candidates.push(format!("Steps and process for {}", core));
    } else if lower.starts_with("why") {
        candidates.push(format!("Reasons behind {}", core));
    } else if lower.starts_with("when") {
        candidates.push(format!("Date and timeline of {}", core));
    } else {
        candidates.push(format!("Overview of {}", core));
    }
    candidates.push(format!("{} details and summary", core));

    let mut out: Vec<String> = Vec::new();
    for c in candidates {
        if c.eq_ignore_ascii_case(query.trim()) || out.iter().any(|o| o.eq_ignore_ascii_case(&c)) { continue; }
        out.push(c);
        if out.len() >= max { break; }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_strips_question_scaffolding() {
        assert_eq!(keyword_core("What were Q3 results?"), "Q3 results");
        assert_eq!(keyword_core("how do I"), "I");
        assert_eq!(keyword_core("what is the"), "");
    }

    #[test]
    fn expansion_is_bounded_and_excludes_the_query() {
        let v = expand_query("Why did revenue drop?", 3);
        assert_eq!(v.len(), 3);
        assert_eq!(v[0], "revenue drop");
        assert!(v[1].starts_with("Reasons behind"));
        assert_eq!(expand_query("revenue", 3).len(), 2, "core equal to query is skipped");
        assert_eq!(expand_query("Why did revenue drop?", 1).len(), 1);
        assert!(expand_query("what is the", 3).is_empty());
    }
}
