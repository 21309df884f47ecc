//! Deterministic providers for tests and local development.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatMessage, ChatModel, ChatStream, last_user_message};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Hashes each lowercase word into a bucket and L2-normalises the counts.
///
/// Texts sharing words get a positive cosine similarity; texts with no
/// words in common score zero (barring bucket collisions).
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    calls: AtomicUsize,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1), calls: AtomicUsize::new(0) }
    }

    /// Number of upstream `embed`/`embed_batch` calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled { operation: "embed".into() });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vectorize(text))
    }

    async fn embed_batch(
        &self,
        texts: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled { operation: "embed".into() });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

/// Answers every conversation with a fixed prefix and the last user message.
#[derive(Debug, Clone)]
pub struct MockChatModel {
    reply_prefix: String,
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new("You asked:")
    }
}

impl MockChatModel {
    pub fn new(reply_prefix: impl Into<String>) -> Self {
        Self { reply_prefix: reply_prefix.into() }
    }

    fn reply(&self, messages: &[ChatMessage]) -> String {
        format!("{} {}", self.reply_prefix, last_user_message(messages).unwrap_or_default())
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn name(&self) -> &str {
        "mock-chat"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled { operation: "chat".into() });
        }
        Ok(self.reply(messages))
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<ChatStream> {
        let reply = self.complete(messages, cancel).await?;
        let deltas: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        let state = (deltas.into_iter(), cancel.clone(), false);

        let deltas = stream::unfold(state, |(mut rest, cancel, stopped)| async move {
            if stopped {
                return None;
            }
            if cancel.is_cancelled() {
                let err = RagError::Cancelled { operation: "chat stream".into() };
                return Some((Err(err), (rest, cancel, true)));
            }
            rest.next().map(|delta| (Ok(delta), (rest, cancel, false)))
        });
        Ok(Box::pin(deltas))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::inmemory::cosine_similarity;

    #[tokio::test]
    async fn shared_words_score_higher() {
        let provider = MockEmbeddingProvider::new(256);
        let cancel = CancellationToken::new();
        let query = provider.embed("machine learning", &cancel).await.unwrap();
        let related = provider.embed("An intro to machine learning", &cancel).await.unwrap();
        let unrelated = provider.embed("cooking pasta tonight", &cancel).await.unwrap();

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn streamed_reply_matches_completion() {
        let model = MockChatModel::default();
        let cancel = CancellationToken::new();
        let messages = [ChatMessage::user("what is rust?")];

        let full = model.complete(&messages, &cancel).await.unwrap();
        let streamed: Vec<String> =
            model.stream(&messages, &cancel).await.unwrap().map(|d| d.unwrap()).collect().await;
        assert_eq!(streamed.concat(), full);
        assert_eq!(full, "You asked: what is rust?");
    }

    #[tokio::test]
    async fn stream_stops_with_cancelled_once_token_fires() {
        let model = MockChatModel::default();
        let cancel = CancellationToken::new();
        let messages = [ChatMessage::user("what is rust?")];
        let mut deltas = model.stream(&messages, &cancel).await.unwrap();

        assert_eq!(deltas.next().await.unwrap().unwrap(), "You ");
        cancel.cancel();
        assert!(matches!(deltas.next().await, Some(Err(RagError::Cancelled { .. }))));
        assert!(deltas.next().await.is_none());
    }
}
