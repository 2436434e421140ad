//! Download-slot affinity and timeout budgeting for rendering calls.
//!
//! A rendering call stands in for a page fetch, so it reuses that page's
//! download slot (keeping the engine's per-host concurrency and delay limits
//! intact) and gets a timeout long enough to cover the render itself.

use std::sync::Arc;
use std::time::Duration;

use rendergate_types::{CrawlRequest, SlotKey};

/// The crawl engine's slot-assignment function.
pub trait SlotAssigner: Send + Sync {
    fn slot_key(&self, request: &CrawlRequest) -> SlotKey;
}

/// Slot assignment by explicit `slot_key` metadata, falling back to the URL host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSlots;

impl SlotAssigner for HostSlots {
    fn slot_key(&self, request: &CrawlRequest) -> SlotKey {
        if let Some(explicit) = &request.meta.slot_key {
            return explicit.clone();
        }
        SlotKey::new(request.url.host_str().unwrap_or_default())
    }
}

impl<F> SlotAssigner for F
where
    F: Fn(&CrawlRequest) -> SlotKey + Send + Sync,
{
    fn slot_key(&self, request: &CrawlRequest) -> SlotKey {
        self(request)
    }
}

#[derive(Clone)]
pub struct Coordinator {
    slots: Arc<dyn SlotAssigner>,
    respect_slots: bool,
    margin: Duration,
    engine_timeout: Duration,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("respect_slots", &self.respect_slots)
            .field("margin", &self.margin)
            .field("engine_timeout", &self.engine_timeout)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// `engine_timeout` is the engine's download timeout for requests that
    /// carry none.
    pub fn new(
        slots: Arc<dyn SlotAssigner>,
        respect_slots: bool,
        margin: Duration,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            slots,
            respect_slots,
            margin,
            engine_timeout,
        }
    }

    /// Slot for a rendering call made on behalf of `original`.
    ///
    /// `None` when slot affinity is turned off; the engine then slots the
    /// call by the rendering service's own host.
    #[must_use]
    pub fn slot_key_for(&self, original: &CrawlRequest) -> Option<SlotKey> {
        self.respect_slots
            .then(|| self.slots.slot_key(original))
    }

    /// Budget for a rendering call. A request without its own timeout starts
    /// from the engine's, so the budget never drops below a plain fetch's.
    #[must_use]
    pub fn extended_timeout(&self, current: Option<Duration>, declared_secs: f64) -> Duration {
        let current = current.unwrap_or(self.engine_timeout);
        extended_timeout(Some(current), declared_secs, self.margin)
    }

    #[must_use]
    pub fn margin(&self) -> Duration {
        self.margin
    }
}

/// `max(current, declared + margin)`; with no current timeout, `declared + margin`.
#[must_use]
pub fn extended_timeout(current: Option<Duration>, declared_secs: f64, margin: Duration) -> Duration {
    let declared = Duration::try_from_secs_f64(declared_secs).unwrap_or(Duration::MAX);
    let needed = declared.saturating_add(margin);
    current.map_or(needed, |current| current.max(needed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergate_types::Url;

    fn request(url: &str) -> CrawlRequest {
        CrawlRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn host_slots_use_hostname() {
        assert_eq!(
            HostSlots.slot_key(&request("http://example.com:8080/page")),
            SlotKey::new("example.com")
        );
    }

    #[test]
    fn host_slots_prefer_explicit_slot() {
        let mut req = request("http://example.com/page");
        req.meta.slot_key = Some(SlotKey::new("shared-pool"));
        assert_eq!(HostSlots.slot_key(&req), SlotKey::new("shared-pool"));
    }

    #[test]
    fn closures_are_slot_assigners() {
        let coordinator = Coordinator::new(
            Arc::new(|r: &CrawlRequest| SlotKey::new(format!("slot:{}", r.url.path()))),
            true,
            Duration::from_secs(30),
            Duration::from_secs(180),
        );
        assert_eq!(
            coordinator.slot_key_for(&request("http://a.test/x")),
            Some(SlotKey::new("slot:/x"))
        );
    }

    #[test]
    fn slots_can_be_disabled() {
        let coordinator = Coordinator::new(Arc::new(HostSlots), false, Duration::ZERO, Duration::ZERO);
        assert_eq!(coordinator.slot_key_for(&request("http://a.test/")), None);
    }

    #[test]
    fn timeout_takes_the_larger_budget() {
        let margin = Duration::from_secs(30);
        assert_eq!(
            extended_timeout(Some(Duration::from_secs(180)), 60.0, margin),
            Duration::from_secs(180)
        );
        assert_eq!(
            extended_timeout(Some(Duration::from_secs(10)), 60.0, margin),
            Duration::from_secs(90)
        );
        assert_eq!(extended_timeout(None, 5.5, margin), Duration::from_secs_f64(35.5));
    }

    #[test]
    fn missing_timeout_starts_from_engine_default() {
        let coordinator = Coordinator::new(
            Arc::new(HostSlots),
            true,
            Duration::from_secs(30),
            Duration::from_secs(180),
        );
        assert_eq!(
            coordinator.extended_timeout(None, 60.0),
            Duration::from_secs(180)
        );
        assert_eq!(
            coordinator.extended_timeout(None, 300.0),
            Duration::from_secs(330)
        );
        assert_eq!(
            coordinator.extended_timeout(Some(Duration::from_secs(10)), 60.0),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn absurd_timeouts_saturate() {
        assert_eq!(
            extended_timeout(None, f64::MAX, Duration::from_secs(30)),
            Duration::MAX
        );
    }
}
