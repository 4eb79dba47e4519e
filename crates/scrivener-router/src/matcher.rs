//! Embedding-similarity matcher over labeled intent examples.
//!
//! Bounded store; when full, the configured eviction policy makes room.
//! `nearest_intent` reports the best match's similarity (scaled by the
//! example's own confidence) and how strongly the close neighbors agree.

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::Serialize;

use scrivener_core::config::{EvictionPolicy, RouterSettings};
use scrivener_core::math::cosine_similarity;
use scrivener_core::types::{Intent, IntentExample};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOutcome {
    /// `None` on a cold start.
    pub intent: Option<Intent>,
    pub confidence: f32,
    /// Share of in-band neighbors voting for `intent`.
    pub agreement: f32,
    pub neighbors: usize,
}

impl MatchOutcome {
    pub fn empty() -> Self { Self { intent: None, confidence: 0.0, agreement: 0.0, neighbors: 0 } }
}

pub struct EmbeddingMatcher {
    examples: RwLock<VecDeque<IntentExample>>,
    capacity: usize,
    eviction: EvictionPolicy,
    neighbor_k: usize,
    neighbor_min_similarity: f32,
}

impl EmbeddingMatcher {
    pub fn new(settings: &RouterSettings) -> Self {
        Self {
            examples: RwLock::new(VecDeque::new()),
            capacity: settings.example_capacity.max(1),
            eviction: settings.eviction,
            neighbor_k: settings.neighbor_k.max(1),
            neighbor_min_similarity: settings.neighbor_min_similarity,
        }
    }

    pub fn len(&self) -> usize { self.examples.read().unwrap_or_else(|e| e.into_inner()).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn capacity(&self) -> usize { self.capacity }

    pub fn add(&self, example: IntentExample) {
        let mut store = self.examples.write().unwrap_or_else(|e| e.into_inner());
        while store.len() >= self.capacity {
            let victim = match self.eviction {
                EvictionPolicy::Oldest => 0,
                EvictionPolicy::LowestConfidence => store
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0),
            };
            if let Some(gone) = store.remove(victim) {
                tracing::debug!(intent = %gone.intent, confidence = gone.confidence, "intent example evicted");
            }
        }
        store.push_back(example);
    }

    pub fn nearest_intent(&self, query_embedding: &[f32]) -> MatchOutcome {
        let store = self.examples.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(f32, &IntentExample)> = store.iter().map(|ex| (cosine_similarity(query_embedding, &ex.embedding), ex)).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let Some(&(best_sim, best)) = scored.first() else { return MatchOutcome::empty() };

        let band: Vec<&(f32, &IntentExample)> = scored
            .iter()
            .take(self.neighbor_k)
            .filter(|(sim, _)| *sim >= self.neighbor_min_similarity)
            .collect();
        let agreement = if band.is_empty() {
            0.0
        } else {
            band.iter().filter(|(_, ex)| ex.intent == best.intent).count() as f32 / band.len() as f32
        };
        MatchOutcome {
            intent: Some(best.intent),
            confidence: (best_sim * best.confidence.clamp(0.0, 1.0)).max(0.0),
            agreement,
            neighbors: band.len(),
        }
    }
}
