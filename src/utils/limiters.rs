use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::settings::LimitsConfig;

/// Concurrency guards for the blocking backends. Shared process-wide so a
/// burst of indexing runs cannot starve interactive chat traffic.
#[derive(Clone)]
pub struct Limiters {
    pub embedding: Arc<Semaphore>,
    pub vector_search: Arc<Semaphore>,
    pub llm_generate: Arc<Semaphore>,
    acquire_timeout: Duration,
}

/// Held slot on one of the backend limiters. The slot is released on drop;
/// `waited` records how long the caller sat in the queue.
#[derive(Debug)]
pub struct LimiterSlot {
    _permit: OwnedSemaphorePermit,
    pub waited: Duration,
}

impl Limiters {
    pub fn new(cfg: &LimitsConfig) -> Self {
        fn guarded(slots: usize) -> Arc<Semaphore> {
            Arc::new(Semaphore::new(slots.max(1)))
        }

        Self {
            embedding: guarded(cfg.embedding_concurrency),
            vector_search: guarded(cfg.vector_search_concurrency),
            llm_generate: guarded(cfg.llm_generate_concurrency),
            acquire_timeout: Duration::from_millis(cfg.acquire_timeout_ms.max(1)),
        }
    }

    /// Wait for a slot on the given limiter, giving up after the configured
    /// queue timeout.
    pub async fn checkout(&self, sem: &Arc<Semaphore>, op: &'static str) -> Result<LimiterSlot> {
        let queued_at = Instant::now();

        match tokio::time::timeout(self.acquire_timeout, Arc::clone(sem).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(LimiterSlot {
                _permit: permit,
                waited: queued_at.elapsed(),
            }),
            Ok(Err(closed)) => Err(anyhow!("{} limiter is closed: {}", op, closed)),
            Err(_) => Err(anyhow!(
                "gave up waiting for a {} slot after {}ms",
                op,
                self.acquire_timeout.as_millis()
            )),
        }
    }
}
