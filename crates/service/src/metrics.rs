//! Prometheus metrics for the diff service.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Counters and gauges for the service loop.
///
/// Tracks event intake (received / dropped for lack of subscribers / skipped
/// for a missing parent), payload delivery, and the live subscription count.
#[derive(Clone, Default)]
pub struct ServiceMetrics {
    /// Chain events taken off the event channel.
    pub events_received: Counter,
    /// Events dropped because no subscriber was registered.
    pub events_dropped: Counter,
    /// Events skipped because the parent block could not be found.
    pub events_skipped: Counter,
    /// Payloads delivered to subscriber channels.
    pub payloads_sent: Counter,
    /// Payloads dropped because a subscriber channel was not ready.
    pub payloads_dropped: Counter,
    /// Currently registered subscriptions across all types.
    pub active_subscriptions: Gauge,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_event(&self) {
        self.events_received.inc();
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.inc();
    }

    #[inline]
    pub fn record_event_skipped(&self) {
        self.events_skipped.inc();
    }

    #[inline]
    pub fn record_payload_sent(&self) {
        self.payloads_sent.inc();
    }

    #[inline]
    pub fn record_payload_dropped(&self) {
        self.payloads_dropped.inc();
    }

    #[inline]
    pub fn set_subscriptions(&self, count: usize) {
        self.active_subscriptions.set(count as i64);
    }

    /// Register all metrics with a Prometheus registry.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "statefeed_events_received",
            "Chain events taken off the event channel",
            self.events_received.clone(),
        );
        registry.register(
            "statefeed_events_dropped",
            "Chain events dropped because no subscriber was registered",
            self.events_dropped.clone(),
        );
        registry.register(
            "statefeed_events_skipped",
            "Chain events skipped because the parent block was missing",
            self.events_skipped.clone(),
        );
        registry.register(
            "statefeed_payloads_sent",
            "Payloads delivered to subscriber channels",
            self.payloads_sent.clone(),
        );
        registry.register(
            "statefeed_payloads_dropped",
            "Payloads dropped because a subscriber channel was not ready",
            self.payloads_dropped.clone(),
        );
        registry.register(
            "statefeed_active_subscriptions",
            "Currently registered subscriptions",
            self.active_subscriptions.clone(),
        );
    }

    /// Encode the metrics in Prometheus text format.
    pub fn encode_prometheus(&self) -> String {
        let mut registry = Registry::default();
        self.register(&mut registry);

        let mut buffer = String::new();
        if encode(&mut buffer, &registry).is_err() {
            return String::from("# Error encoding metrics\n");
        }
        buffer
    }
}
