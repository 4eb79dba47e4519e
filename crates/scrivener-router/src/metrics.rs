use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use scrivener_core::types::{Method, RouterClassification};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouterMetrics {
    pub total_requests: u64,
    pub average_confidence: f32,
    pub average_latency_ms: f32,
    pub method_counts: BTreeMap<String, u64>,
    pub intent_counts: BTreeMap<String, u64>,
    pub feedback_count: u64,
    pub corrections: u64,
}

impl RouterMetrics {
    pub fn method_count(&self, method: Method) -> u64 { self.method_counts.get(method.as_str()).copied().unwrap_or(0) }
}

#[derive(Default)]
pub(crate) struct MetricsRecorder {
    inner: Mutex<RouterMetrics>,
}

impl MetricsRecorder {
    pub fn record(&self, c: &RouterClassification) {
        let mut m = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        m.total_requests += 1;
        let n = m.total_requests as f32;
        m.average_confidence += (c.confidence - m.average_confidence) / n;
        m.average_latency_ms += (c.latency_ms as f32 - m.average_latency_ms) / n;
        *m.method_counts.entry(c.method.as_str().to_string()).or_default() += 1;
        *m.intent_counts.entry(c.intent.as_str().to_string()).or_default() += 1;
    }

    pub fn record_feedback(&self, corrected: bool) {
        let mut m = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        m.feedback_count += 1;
        if corrected { m.corrections += 1; }
    }

    pub fn snapshot(&self) -> RouterMetrics { self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::types::{Intent, Slots};

    fn classification(intent: Intent, method: Method, confidence: f32, latency_ms: u64) -> RouterClassification {
        RouterClassification { intent, confidence, slots: Slots::default(), method, reasoning: None, latency_ms }
    }

    #[test]
    fn running_averages_and_counts() {
        let r = MetricsRecorder::default();
        r.record(&classification(Intent::Ask, Method::Embedding, 0.9, 10));
        r.record(&classification(Intent::RagQuery, Method::Meta, 0.5, 30));
        r.record_feedback(true);
        r.record_feedback(false);
        let m = r.snapshot();
        assert_eq!(m.total_requests, 2);
        assert!((m.average_confidence - 0.7).abs() < 1e-6);
        assert!((m.average_latency_ms - 20.0).abs() < 1e-6);
        assert_eq!(m.method_count(Method::Embedding), 1);
        assert_eq!(m.method_count(Method::Classifier), 0);
        assert_eq!(m.intent_counts.get("rag_query"), Some(&1));
        assert_eq!((m.feedback_count, m.corrections), (2, 1));
    }
}
