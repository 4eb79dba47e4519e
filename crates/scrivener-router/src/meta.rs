//! LLM meta-classifier, the most expensive signal in the cascade.
//!
//! Asks the model for a JSON verdict. Timeouts and transient upstream errors
//! are retried a bounded number of times; anything still failing becomes
//! [`MetaOutcome::Unavailable`] rather than an error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scrivener_core::config::RouterSettings;
use scrivener_core::traits::LlmService;
use scrivener_core::types::{CompletionOptions, Intent, Method, RouterContext};
use scrivener_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetaOutcome {
    Classified { intent: Intent, confidence: f32, reasoning: Option<String> },
    Unavailable { reason: String },
}

/// A cheaper signal's opinion, shown to the model as a hint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalHint {
    pub method: Method,
    pub intent: Intent,
    pub confidence: f32,
}

#[derive(Deserialize)]
struct Verdict {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct MetaClassifier {
    llm: Option<Arc<dyn LlmService>>,
    timeout: Duration,
    max_attempts: u32,
    options: CompletionOptions,
}

impl MetaClassifier {
    pub fn new(llm: Arc<dyn LlmService>, settings: &RouterSettings) -> Self {
        Self { llm: Some(llm), ..Self::disabled(settings) }
    }

    pub fn disabled(settings: &RouterSettings) -> Self {
        Self {
            llm: None,
            timeout: Duration::from_millis(settings.meta_timeout_ms),
            max_attempts: settings.meta_max_attempts.max(1),
            options: CompletionOptions { temperature: 0.0, max_tokens: 200 },
        }
    }

    pub fn is_available(&self) -> bool { self.llm.is_some() }

    pub async fn classify(&self, query: &str, context: &RouterContext, hints: &[SignalHint]) -> MetaOutcome {
        let Some(llm) = &self.llm else { return MetaOutcome::Unavailable { reason: "no language model configured".into() } };
        let prompt = build_prompt(query, context, hints);
        let mut last = String::new();
        for attempt in 1..=self.max_attempts {
            let reply = match tokio::time::timeout(self.timeout, llm.complete(&prompt, &self.options)).await {
                Ok(r) => r,
                Err(_) => Err(Error::transient("llm", format!("meta-classifier timed out after {}ms", self.timeout.as_millis()))),
            };
            match reply.and_then(|text| parse_verdict(&text)) {
                Ok((intent, confidence, reasoning)) => return MetaOutcome::Classified { intent, confidence, reasoning },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "meta-classifier attempt failed");
                    let retry = e.is_transient();
                    last = e.to_string();
                    if !retry { break; }
                }
            }
        }
        MetaOutcome::Unavailable { reason: last }
    }
}

fn build_prompt(query: &str, context: &RouterContext, hints: &[SignalHint]) -> String {
    let labels = Intent::ALL.iter().map(|i| i.as_str()).collect::<Vec<_>>().join(", ");
    let mut prompt = format!(
        "Classify the user's request into exactly one intent: {}.\n\
         Context: documents attached: {}; selection present: {} ({} chars); conversation turns: {}; recent tools: [{}].\n",
        labels,
        context.has_documents,
        context.has_selection,
        context.selection_length,
        context.conversation_length,
        context.recent_tools.join(", "),
    );
    if !hints.is_empty() {
        prompt.push_str("Weaker signals suggested:\n");
        for h in hints { prompt.push_str(&format!("- {}: {} ({:.2})\n", h.method, h.intent, h.confidence)); }
    }
    prompt.push_str(&format!(
        "Request: {}\nAnswer with JSON only: {{\"intent\": \"<label>\", \"confidence\": <0..1>, \"reasoning\": \"<one sentence>\"}}",
        query
    ));
    prompt
}

/// Extract the first `{...}` object of a reply and read the verdict from it.
pub fn parse_verdict(text: &str) -> Result<(Intent, f32, Option<String>)> {
    let start = text.find('{').ok_or_else(|| Error::operation("meta-classifier reply has no JSON object"))?;
    let end = text.rfind('}').filter(|e| *e > start).ok_or_else(|| Error::operation("meta-classifier reply has no JSON object"))?;
    let verdict: Verdict = serde_json::from_str(&text[start..=end]).map_err(|e| Error::operation(format!("meta-classifier reply: {}", e)))?;
    let intent: Intent = verdict.intent.parse().map_err(|_| Error::operation(format!("meta-classifier chose unknown intent '{}'", verdict.intent)))?;
    let confidence = verdict.confidence.filter(|c| c.is_finite()).unwrap_or(0.5).clamp(0.0, 1.0);
    Ok((intent, confidence, verdict.reasoning.filter(|r| !r.trim().is_empty())))
}
