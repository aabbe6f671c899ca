//! ratelimit.rs — Per-tenant fixed-window admission control.
//!
//! The limiter owns only the admission algorithm; the counter lives in a
//! shared `CounterStore` whose increment-within-window operation is atomic.
//! Window rollover is lazy: the first call at or past expiry starts a new
//! window, there is no background sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use metrics::counter;

/// Counter snapshot after one atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub window_start: u64,
}

/// Shared counter collaborator. A production deployment backs this with a
/// store offering atomic increment-with-expiry (Redis INCR/EXPIRE shaped);
/// `MemoryCounterStore` is the in-process reference implementation.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the key's counter within its current window.
    /// A call at or after `window_start + window_secs` resets the counter
    /// and starts a new window at `now_unix` before incrementing.
    async fn incr_window(
        &self,
        key: &str,
        window_secs: u64,
        now_unix: u64,
    ) -> anyhow::Result<WindowState>;
}

/// Mutex-guarded map; the guard makes increment-and-compare atomic for
/// concurrent admissions of the same tenant.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    inner: Mutex<HashMap<String, WindowState>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_window(
        &self,
        key: &str,
        window_secs: u64,
        now_unix: u64,
    ) -> anyhow::Result<WindowState> {
        let mut map = self.inner.lock().expect("counter store mutex poisoned");
        let slot = map.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            window_start: now_unix,
        });
        if now_unix >= slot.window_start.saturating_add(window_secs) {
            slot.window_start = now_unix;
            slot.count = 0;
        }
        slot.count = slot.count.saturating_add(1);
        Ok(*slot)
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }

    /// Admit or deny one request for the tenant, counted against the
    /// current window.
    pub async fn admit(&self, tenant_id: &str) -> anyhow::Result<Admission> {
        self.admit_at(tenant_id, now_unix()).await
    }

    /// Same as `admit`, with an explicit clock for tests.
    pub async fn admit_at(&self, tenant_id: &str, now_unix: u64) -> anyhow::Result<Admission> {
        let state = self
            .store
            .incr_window(tenant_id, self.window.as_secs(), now_unix)
            .await?;

        if state.count > self.limit {
            let reset_at = state.window_start.saturating_add(self.window.as_secs());
            let retry_after = Duration::from_secs(reset_at.saturating_sub(now_unix));
            counter!("rate_limit_denied_total").increment(1);
            return Ok(Admission::Denied { retry_after });
        }
        Ok(Admission::Allowed)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            limit,
            Duration::from_secs(window_secs),
        )
    }

    #[tokio::test]
    async fn fourth_call_in_window_is_denied() {
        let rl = limiter(3, 60);
        let t0 = 1_000_000;

        for i in 0..3 {
            assert!(rl.admit_at("acme", t0 + i).await.unwrap().is_allowed());
        }
        match rl.admit_at("acme", t0 + 10).await.unwrap() {
            Admission::Denied { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(50));
            }
            Admission::Allowed => panic!("4th call must be denied"),
        }
    }

    #[tokio::test]
    async fn window_expiry_resets_lazily() {
        let rl = limiter(3, 60);
        let t0 = 1_000_000;

        for i in 0..4 {
            let _ = rl.admit_at("acme", t0 + i).await.unwrap();
        }
        // First call after expiry opens a fresh window with count 1.
        assert!(rl.admit_at("acme", t0 + 60).await.unwrap().is_allowed());
        assert!(rl.admit_at("acme", t0 + 61).await.unwrap().is_allowed());
        assert!(rl.admit_at("acme", t0 + 62).await.unwrap().is_allowed());
        assert!(!rl.admit_at("acme", t0 + 63).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn tenants_have_independent_windows() {
        let rl = limiter(1, 60);
        let t0 = 5_000;
        assert!(rl.admit_at("a", t0).await.unwrap().is_allowed());
        assert!(!rl.admit_at("a", t0 + 1).await.unwrap().is_allowed());
        assert!(rl.admit_at("b", t0 + 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn concurrent_admissions_never_lose_updates() {
        let store = Arc::new(MemoryCounterStore::new());
        let rl = Arc::new(RateLimiter::new(store.clone(), 100, Duration::from_secs(60)));
        let t0 = 42;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let rl = rl.clone();
            handles.push(tokio::spawn(async move { rl.admit_at("t", t0).await }));
        }
        for h in handles {
            assert!(h.await.unwrap().unwrap().is_allowed());
        }

        // 51st observation: monotonically counted, no lost increments.
        let state = store.incr_window("t", 60, t0).await.unwrap();
        assert_eq!(state.count, 51);
    }
}
