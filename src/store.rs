//! store.rs — Persistence collaborator boundary.
//!
//! The orchestrator hands a finished `Insight` to an `InsightStore` post-hoc
//! and never depends on the result. The in-memory implementation backs tests
//! and the demo binary; durable storage is an external concern.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::insight::Insight;

#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Store one completed insight. Failures are the caller's to log, not
    /// to propagate into the response.
    async fn persist(&self, insight: &Insight) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryInsightStore {
    inner: Mutex<Vec<Insight>>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("insight store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<Insight> {
        let v = self.inner.lock().expect("insight store mutex poisoned");
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }
}

#[async_trait]
impl InsightStore for MemoryInsightStore {
    async fn persist(&self, insight: &Insight) -> anyhow::Result<()> {
        self.inner
            .lock()
            .expect("insight store mutex poisoned")
            .push(insight.clone());
        Ok(())
    }
}
