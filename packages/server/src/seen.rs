//! Idempotency keys already accepted by the collector.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;

/// Bounded set of recently seen idempotency keys.
pub struct SeenKeys {
    keys: Mutex<LruCache<String, ()>>,
}

impl SeenKeys {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            keys: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Record `key`. Returns `false` when it was already present.
    pub async fn insert(&self, key: &str) -> bool {
        let mut keys = self.keys.lock().await;
        if keys.get(key).is_some() {
            return false;
        }
        keys.put(key.to_string(), ());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_key_is_reported_once() {
        let seen = SeenKeys::new(2);
        assert!(seen.insert("job:a@x.com").await);
        assert!(!seen.insert("job:a@x.com").await);
        assert!(seen.insert("job:b@x.com").await);
        assert!(seen.insert("job:c@x.com").await);
        // Evicted by capacity.
        assert!(seen.insert("job:a@x.com").await);
    }
}
