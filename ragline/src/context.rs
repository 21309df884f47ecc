//! Assembles retrieved chunks into prompt context under a token budget.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{PointId, SearchResult};
use crate::token::{CharRatioTokenCounter, TokenCounter};

const SEPARATOR: &str = "\n\n";

/// Attribution for one chunk included in the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSource {
    pub id: PointId,
    pub document_id: String,
    pub filename: String,
    pub chunk_index: u32,
    pub score: f32,
}

/// The context string handed to the chat model, with what went into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<ContextSource>,
    /// Token count of `text` according to the assembler's counter.
    pub token_count: usize,
    /// Results left out because the budget ran out.
    pub omitted: usize,
}

impl AssembledContext {
    pub fn empty() -> Self {
        Self { text: String::new(), sources: Vec::new(), token_count: 0, omitted: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Greedily packs the highest-scoring results into a token budget.
///
/// Results are taken in descending score order (ties keep input order). Each
/// is rendered as `[Source: {filename} #{chunk_index}]` followed by its
/// content; entries are separated by a blank line. Packing stops at the first
/// result that would push the total over budget.
#[derive(Clone)]
pub struct ContextAssembler {
    counter: Arc<dyn TokenCounter>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(Arc::new(CharRatioTokenCounter::default()))
    }
}

impl ContextAssembler {
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    pub fn assemble(&self, results: &[SearchResult], budget: usize) -> AssembledContext {
        let mut ranked: Vec<&SearchResult> = results.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut context = AssembledContext::empty();
        for (taken, result) in ranked.iter().enumerate() {
            let entry = format!(
                "[Source: {} #{}]\n{}",
                result.payload.filename, result.payload.chunk_index, result.payload.content
            );
            let candidate = if context.text.is_empty() {
                entry
            } else {
                format!("{}{SEPARATOR}{entry}", context.text)
            };

            let tokens = self.counter.count(&candidate);
            if tokens > budget {
                context.omitted = ranked.len() - taken;
                break;
            }

            context.text = candidate;
            context.token_count = tokens;
            context.sources.push(ContextSource {
                id: result.id,
                document_id: result.payload.document_id.clone(),
                filename: result.payload.filename.clone(),
                chunk_index: result.payload.chunk_index,
                score: result.score,
            });
        }

        debug!(
            included = context.sources.len(),
            omitted = context.omitted,
            tokens = context.token_count,
            budget,
            "assembled context"
        );
        context
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::document::{ChunkPayload, UserId};

    fn result(doc: &str, score: f32, content: &str) -> SearchResult {
        SearchResult {
            id: PointId::for_chunk(&UserId::new("u").unwrap(), doc, 0),
            score,
            payload: ChunkPayload {
                document_id: doc.into(),
                user_id: UserId::new("u").unwrap(),
                chunk_index: 0,
                content: content.into(),
                filename: format!("{doc}.txt"),
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn includes_in_score_order_with_attribution() {
        let assembler = ContextAssembler::default();
        let results = [result("low", 0.2, "second"), result("high", 0.9, "first")];
        let context = assembler.assemble(&results, 1_000);

        assert_eq!(context.text, "[Source: high.txt #0]\nfirst\n\n[Source: low.txt #0]\nsecond");
        assert_eq!(context.sources.len(), 2);
        assert_eq!(context.sources[0].document_id, "high");
        assert_eq!(context.omitted, 0);
    }

    #[test]
    fn stops_at_first_result_over_budget() {
        let assembler = ContextAssembler::new(Arc::new(CharRatioTokenCounter::new(1)));
        let results = [
            result("a", 0.9, "short"),
            result("b", 0.8, &"x".repeat(500)),
            result("c", 0.7, "tiny"),
        ];
        let context = assembler.assemble(&results, 60);

        assert_eq!(context.sources.len(), 1);
        assert_eq!(context.omitted, 2);
        assert!(context.token_count <= 60);
    }

    #[test]
    fn zero_budget_yields_empty_context() {
        let context = ContextAssembler::default().assemble(&[result("a", 0.5, "text")], 0);
        assert!(context.is_empty());
        assert_eq!(context.text, "");
        assert_eq!(context.omitted, 1);
    }

    #[test]
    fn assembly_is_deterministic() {
        let assembler = ContextAssembler::default();
        let results = [result("a", 0.5, "one"), result("b", 0.5, "two"), result("c", 0.7, "three")];
        assert_eq!(assembler.assemble(&results, 40), assembler.assemble(&results, 40));
    }

    #[test]
    fn nan_scores_do_not_break_ordering() {
        let results: Vec<SearchResult> = (0..40)
            .map(|i| {
                let score = if i % 3 == 0 { f32::NAN } else { i as f32 / 40.0 };
                result(&format!("d{i}"), score, "x")
            })
            .collect();

        let context = ContextAssembler::default().assemble(&results, 10_000);

        assert_eq!(context.sources.len(), results.len());
        let finite: Vec<f32> =
            context.sources.iter().map(|s| s.score).filter(|s| !s.is_nan()).collect();
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
    }
}
