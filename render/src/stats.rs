//! Render counters shared across in-flight requests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RenderStats {
    requests_issued: AtomicU64,
    responses_received: RwLock<BTreeMap<u16, AtomicU64>>,
}

/// Point-in-time copy of [`RenderStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests_issued: u64,
    pub responses_received: BTreeMap<u16, u64>,
}

impl RenderStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, status: u16) {
        {
            let counters = self
                .responses_received
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = counters.get(&status) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let mut counters = self
            .responses_received
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        counters
            .entry(status)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn responses_received(&self, status: u16) -> u64 {
        self.responses_received
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let responses_received = self
            .responses_received
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(status, count)| (*status, count.load(Ordering::Relaxed)))
            .collect();
        StatsSnapshot {
            requests_issued: self.requests_issued(),
            responses_received,
        }
    }
}
