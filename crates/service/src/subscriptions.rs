//! Subscription bookkeeping for the diff service.
//!
//! Subscribers are bucketed by *subscription type*: the keccak hash of the
//! canonical RLP encoding of their [`Params`]. Everyone in a bucket receives
//! identical payloads, so each type's payload is built once per block.

use std::collections::HashMap;

use alloy_primitives::{keccak256, B256};
use tokio::sync::mpsc;
use tracing::info;

use crate::types::{Params, Payload};

/// Opaque client identifier chosen by the subscriber.
pub type SubscriberId = String;

/// A live subscription: where payloads go and where the shutdown signal goes.
///
/// Both channels are written non-blocking; a subscriber that is not ready
/// misses the message.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub payloads: mpsc::Sender<Payload>,
    pub quit: mpsc::Sender<bool>,
}

/// The subscription type of `params`: the keccak hash of their canonical RLP
/// encoding. Subscriptions with identical params collapse onto one type.
pub fn subscription_type(params: &Params) -> B256 {
    keccak256(alloy_rlp::encode(params))
}

/// Two-level subscriber table, `type -> id -> subscription`, with the params
/// defining each type alongside.
///
/// All methods are called with the service lock held; the registry itself
/// does no locking.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    buckets: HashMap<B256, HashMap<SubscriberId, Subscription>>,
    params_by_type: HashMap<B256, Params>,
}

impl SubscriptionRegistry {
    pub(crate) fn insert(
        &mut self,
        ty: B256,
        id: SubscriberId,
        subscription: Subscription,
        params: Params,
    ) {
        self.buckets.entry(ty).or_default().insert(id, subscription);
        self.params_by_type.insert(ty, params);
    }

    /// Remove `id` from every bucket, dropping buckets (and their params)
    /// that become empty. Returns `true` when no subscriptions remain.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let params_by_type = &mut self.params_by_type;
        self.buckets.retain(|ty, bucket| {
            bucket.remove(id);
            if bucket.is_empty() {
                params_by_type.remove(ty);
                false
            } else {
                true
            }
        });
        self.buckets.is_empty()
    }

    /// The currently registered subscription types.
    pub(crate) fn types(&self) -> Vec<B256> {
        self.buckets.keys().copied().collect()
    }

    pub(crate) fn params(&self, ty: &B256) -> Option<&Params> {
        self.params_by_type.get(ty)
    }

    pub(crate) fn subscribers(
        &self,
        ty: &B256,
    ) -> impl Iterator<Item = (&SubscriberId, &Subscription)> {
        self.buckets.get(ty).into_iter().flatten()
    }

    /// Total number of subscriptions across all types.
    pub(crate) fn len(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Send a non-blocking quit to every subscriber of `ty` and drop the
    /// bucket and its params.
    pub(crate) fn close_type(&mut self, ty: &B256) {
        if let Some(bucket) = self.buckets.remove(ty) {
            for (id, subscription) in &bucket {
                send_quit(id, subscription);
            }
        }
        self.params_by_type.remove(ty);
    }

    /// Force-close every subscription.
    pub(crate) fn close_all(&mut self) {
        for (_, bucket) in self.buckets.drain() {
            for (id, subscription) in &bucket {
                send_quit(id, subscription);
            }
        }
        self.params_by_type.clear();
    }
}

fn send_quit(id: &str, subscription: &Subscription) {
    // One attempt; subscribers that are not listening miss the signal.
    match subscription.quit.try_send(true) {
        Ok(()) => info!(%id, "closing subscription"),
        Err(_) => info!(%id, "unable to close subscription; channel has no receiver"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn subscription(capacity: usize) -> (Subscription, mpsc::Receiver<Payload>, mpsc::Receiver<bool>) {
        let (payloads, payload_rx) = mpsc::channel(capacity);
        let (quit, quit_rx) = mpsc::channel(1);
        (Subscription { payloads, quit }, payload_rx, quit_rx)
    }

    #[test]
    fn identical_params_share_a_type() {
        let a = Params {
            include_block: true,
            ..Params::default()
        };
        let b = a.clone();
        assert_eq!(subscription_type(&a), subscription_type(&b));
    }

    #[test]
    fn any_field_change_changes_the_type() {
        let base = Params::default();
        let mut with_td = base.clone();
        with_td.include_td = true;
        let mut with_watch = base.clone();
        with_watch.watched_addresses = vec![Address::repeat_byte(0x01)];

        assert_ne!(subscription_type(&base), subscription_type(&with_td));
        assert_ne!(subscription_type(&base), subscription_type(&with_watch));
    }

    #[test]
    fn selector_order_is_part_of_the_fingerprint() {
        let a = Params {
            watched_addresses: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            ..Params::default()
        };
        let b = Params {
            watched_addresses: vec![Address::repeat_byte(0x02), Address::repeat_byte(0x01)],
            ..Params::default()
        };
        assert_ne!(subscription_type(&a), subscription_type(&b));
    }

    #[test]
    fn buckets_collapse_and_split_by_params() {
        let mut registry = SubscriptionRegistry::default();
        let shared = Params::default();
        let distinct = Params {
            include_receipts: true,
            ..Params::default()
        };

        let (sub_a, _rx_a, _qa) = subscription(1);
        let (sub_b, _rx_b, _qb) = subscription(1);
        let (sub_c, _rx_c, _qc) = subscription(1);
        registry.insert(subscription_type(&shared), "a".into(), sub_a, shared.clone());
        registry.insert(subscription_type(&shared), "b".into(), sub_b, shared.clone());
        registry.insert(
            subscription_type(&distinct),
            "c".into(),
            sub_c,
            distinct.clone(),
        );

        assert_eq!(registry.types().len(), 2);
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry
                .subscribers(&subscription_type(&shared))
                .count(),
            2
        );
    }

    #[test]
    fn remove_drops_empty_buckets_and_their_params() {
        let mut registry = SubscriptionRegistry::default();
        let params = Params::default();
        let ty = subscription_type(&params);

        let (sub_a, _rx_a, _qa) = subscription(1);
        let (sub_b, _rx_b, _qb) = subscription(1);
        registry.insert(ty, "a".into(), sub_a, params.clone());
        registry.insert(ty, "b".into(), sub_b, params.clone());

        assert!(!registry.remove("a"));
        assert!(registry.params(&ty).is_some());

        assert!(registry.remove("b"));
        assert!(registry.is_empty());
        assert!(registry.params(&ty).is_none());
    }

    #[test]
    fn close_type_delivers_quits_and_drops_the_bucket() {
        let mut registry = SubscriptionRegistry::default();
        let params = Params::default();
        let ty = subscription_type(&params);

        let (sub, _rx, mut quit_rx) = subscription(1);
        registry.insert(ty, "a".into(), sub, params);
        registry.close_type(&ty);

        assert!(registry.is_empty());
        assert!(registry.params(&ty).is_none());
        assert!(quit_rx.try_recv().unwrap());
    }

    #[test]
    fn close_all_survives_absent_receivers() {
        let mut registry = SubscriptionRegistry::default();
        let params = Params::default();
        let ty = subscription_type(&params);

        let (sub, _rx, quit_rx) = subscription(1);
        // The subscriber went away without unsubscribing.
        drop(quit_rx);
        registry.insert(ty, "a".into(), sub, params);
        registry.close_all();
        assert!(registry.is_empty());
    }
}
