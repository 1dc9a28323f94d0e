use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use extract::{Conversation, TextGenerator};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Memoizes completions by the SHA-256 of the rendered conversation.
pub struct CachedGenerator<G> {
    inner: G,
    responses: DashMap<String, String>,
    max_entries: usize,
}

impl<G: TextGenerator> CachedGenerator<G> {
    pub fn new(inner: G, max_entries: usize) -> Self {
        Self {
            inner,
            responses: DashMap::new(),
            max_entries,
        }
    }

    fn hash_text(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn insert(&self, key: String, response: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.responses.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .responses
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.responses.remove(&key);
            }
        }
        self.responses.insert(key, response);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            responses_cached: self.responses.len(),
            max_entries: self.max_entries,
        }
    }
}

#[async_trait]
impl<G: TextGenerator> TextGenerator for CachedGenerator<G> {
    async fn complete(&self, conversation: &Conversation) -> Result<String> {
        let key = Self::hash_text(&conversation.render());
        if let Some(hit) = self.responses.get(&key) {
            return Ok(hit.value().clone());
        }

        let response = self.inner.complete(conversation).await?;
        self.insert(key, response.clone());
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub responses_cached: usize,
    pub max_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl TextGenerator for Counting {
        async fn complete(&self, conversation: &Conversation) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("reply to {}", conversation.messages.len()))
        }
    }

    #[tokio::test]
    async fn identical_conversations_hit_the_cache() {
        let cached = CachedGenerator::new(Counting::default(), 10);
        let conversation = Conversation::new("system").user("Has lying position followed by pain?");

        let first = cached.complete(&conversation).await.unwrap();
        let second = cached.complete(&conversation).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 1);
        assert_eq!(cached.stats().responses_cached, 1);
    }

    #[tokio::test]
    async fn different_conversations_miss() {
        let cached = CachedGenerator::new(Counting::default(), 10);
        cached.complete(&Conversation::new("a").user("x")).await.unwrap();
        cached.complete(&Conversation::new("a").user("y")).await.unwrap();
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn full_cache_evicts_a_quarter() {
        let cached = CachedGenerator::new(Counting::default(), 8);
        for i in 0..8 {
            cached.complete(&Conversation::new("s").user(format!("q{}", i))).await.unwrap();
        }
        assert_eq!(cached.stats().responses_cached, 8);

        cached.complete(&Conversation::new("s").user("q8")).await.unwrap();
        assert_eq!(cached.stats().responses_cached, 7);
    }

    #[tokio::test]
    async fn zero_capacity_disables_caching() {
        let cached = CachedGenerator::new(Counting::default(), 0);
        let conversation = Conversation::new("s").user("q");
        cached.complete(&conversation).await.unwrap();
        cached.complete(&conversation).await.unwrap();
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 2);
    }
}
