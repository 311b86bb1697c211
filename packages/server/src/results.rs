//! Process-memory store of parsed results.

use std::num::NonZeroUsize;

use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;

struct Slots {
    latest: Option<Value>,
    by_job: LruCache<String, Value>,
}

/// Latest reported result plus a capped history keyed by job id.
///
/// Payloads are stored and returned verbatim. Once full, the history drops
/// the job reported longest ago; reads do not extend an entry's life.
pub struct ResultStore {
    slots: Mutex<Slots>,
}

impl ResultStore {
    pub fn new(history: usize) -> Self {
        let capacity = NonZeroUsize::new(history).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: Mutex::new(Slots {
                latest: None,
                by_job: LruCache::new(capacity),
            }),
        }
    }

    /// Store `payload` as the latest result and, when it names one, under its job id.
    pub async fn put(&self, payload: Value) {
        let job_id = payload
            .get("job_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut slots = self.slots.lock().await;
        if let Some(job_id) = job_id {
            slots.by_job.put(job_id, payload.clone());
        }
        slots.latest = Some(payload);
    }

    pub async fn latest(&self) -> Option<Value> {
        self.slots.lock().await.latest.clone()
    }

    pub async fn for_job(&self, job_id: &str) -> Option<Value> {
        self.slots.lock().await.by_job.peek(job_id).cloned()
    }
}
