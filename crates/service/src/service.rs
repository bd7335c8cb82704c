//! The state-diffing service core.
//!
//! One long-running loop consumes chain-head events, computes the delta
//! between successive state roots through the [`DiffBuilder`], and fans the
//! result out to subscribers bucketed by their params fingerprint. Callers
//! interact from other tasks via [`Service::subscribe`] /
//! [`Service::unsubscribe`] and the point-in-time queries.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use alloy_primitives::{Bytes, B256};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::builder::DiffBuilder;
use crate::chain::{ChainFeedError, ChainSource};
use crate::error::ServiceError;
use crate::metrics::ServiceMetrics;
use crate::subscriptions::{
    subscription_type, SubscriberId, Subscription, SubscriptionRegistry,
};
use crate::types::{Block, BuilderArgs, ChainEvent, Params, Payload};

/// Capacity of the chain-event channel between the node and the loop.
/// Overflow blocks the producer, which is the intended backpressure onto the
/// node.
pub const CHAIN_EVENT_CHANNEL_SIZE: usize = 20_000;

/// Service tuning knobs.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Chain-event channel capacity.
    pub event_channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: CHAIN_EVENT_CHANNEL_SIZE,
        }
    }
}

/// The state-diffing service.
///
/// Generic over the chain node and the differ so hosts wire in their own;
/// tests use in-memory doubles.
pub struct Service<C, B> {
    chain: Arc<C>,
    builder: B,
    config: ServiceConfig,
    /// Subscriber table and its params, behind the single service lock.
    /// Payload construction happens under this lock; subscriptions are few
    /// relative to events, so the contention is accepted.
    subscriptions: Mutex<SubscriptionRegistry>,
    /// Nonzero while at least one subscriber is registered. The loop reads
    /// this on every event to skip diff work when nobody is listening.
    subscriber_count: AtomicI32,
    quit: watch::Sender<bool>,
    metrics: Option<ServiceMetrics>,
}

impl<C, B> Service<C, B>
where
    C: ChainSource + 'static,
    B: DiffBuilder + 'static,
{
    pub fn new(chain: Arc<C>, builder: B) -> Self {
        Self::with_config(chain, builder, ServiceConfig::default())
    }

    pub fn with_config(chain: Arc<C>, builder: B, config: ServiceConfig) -> Self {
        let (quit, _) = watch::channel(false);
        Self {
            chain,
            builder,
            config,
            subscriptions: Mutex::new(SubscriptionRegistry::default()),
            subscriber_count: AtomicI32::new(0),
            quit,
            metrics: None,
        }
    }

    /// Attach metrics; all loop activity is recorded against them.
    pub fn with_metrics(mut self, metrics: ServiceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe to the chain's event feed and spawn the main loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!("starting state diff service");
        let (events_tx, events_rx) = mpsc::channel(self.config.event_channel_capacity);
        let errors_rx = self.chain.subscribe_chain_events(events_tx);
        tokio::spawn(self.run(events_rx, errors_rx))
    }

    /// Signal the loop to shut down. The loop force-closes all subscribers
    /// on its way out; already-delivered payloads are not recalled.
    pub fn stop(&self) {
        info!("stopping state diff service");
        self.quit.send_replace(true);
    }

    /// Main processing loop.
    ///
    /// Single consumer of the chain-event channel; exits on quit or when the
    /// event subscription reports an error or ends.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ChainEvent>,
        mut errors: mpsc::Receiver<ChainFeedError>,
    ) {
        let mut quit = self.quit.subscribe();
        if *quit.borrow() {
            self.close_all();
            return;
        }
        // One-slot parent cache: the previous head is almost always the next
        // event's parent, saving a lookup per block. Loop-local, so it needs
        // no synchronization.
        let mut last_block: Option<Block> = None;
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_chain_event(event, &mut last_block),
                        None => {
                            warn!("chain event channel closed");
                            self.close_all();
                            return;
                        }
                    }
                }
                err = errors.recv() => {
                    match err {
                        Some(err) => warn!("error from chain event subscription: {err}"),
                        None => warn!("chain event subscription ended"),
                    }
                    self.close_all();
                    return;
                }
                _ = quit.changed() => {
                    info!("quitting the state diffing process");
                    self.close_all();
                    return;
                }
            }
        }
    }

    fn handle_chain_event(&self, event: ChainEvent, last_block: &mut Option<Block>) {
        trace!(number = event.block.number, "chain event received");
        if let Some(metrics) = &self.metrics {
            metrics.record_event();
        }
        if self.subscriber_count.load(Ordering::SeqCst) == 0 {
            trace!("no subscribers to the state diffing service; processing is halted");
            if let Some(metrics) = &self.metrics {
                metrics.record_event_dropped();
            }
            return;
        }
        let current = event.block;
        let parent = if last_block
            .as_ref()
            .is_some_and(|last| last.hash == current.parent_hash)
        {
            last_block.clone()
        } else {
            self.chain.block_by_hash(current.parent_hash)
        };
        let parent_root = parent.map(|parent| parent.state_root);
        *last_block = Some(current.clone());
        let Some(parent_root) = parent_root else {
            error!(number = current.number, "parent block not found, skipping this block");
            if let Some(metrics) = &self.metrics {
                metrics.record_event_skipped();
            }
            return;
        };
        self.stream_state_diff(&current, parent_root);
    }

    /// Build one payload per subscription type and deliver it non-blocking.
    ///
    /// A type whose params are missing is an internal inconsistency; its
    /// bucket is closed and processing continues. Subscribers whose channel
    /// is not ready lose this block's payload but stay subscribed.
    fn stream_state_diff(&self, block: &Block, parent_root: B256) {
        let mut subscriptions = self.subscriptions.lock();
        for ty in subscriptions.types() {
            let Some(params) = subscriptions.params(&ty).cloned() else {
                error!(%ty, "subscription type has no parameter set associated with it");
                subscriptions.close_type(&ty);
                continue;
            };
            let payload = match self.process_state_diff(block, parent_root, &params) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(
                        number = block.number,
                        %err,
                        "state diff processing failed for this subscription type"
                    );
                    continue;
                }
            };
            for (id, subscription) in subscriptions.subscribers(&ty) {
                match subscription.payloads.try_send(payload.clone()) {
                    Ok(()) => {
                        debug!(%id, number = block.number, "sending state diff payload");
                        if let Some(metrics) = &self.metrics {
                            metrics.record_payload_sent();
                        }
                    }
                    Err(_) => {
                        info!(
                            %id,
                            number = block.number,
                            "unable to send state diff payload; channel not ready"
                        );
                        if let Some(metrics) = &self.metrics {
                            metrics.record_payload_dropped();
                        }
                    }
                }
            }
        }
    }

    /// Invoke the differ for one transition and assemble the payload.
    fn process_state_diff(
        &self,
        block: &Block,
        parent_root: B256,
        params: &Params,
    ) -> Result<Payload, ServiceError> {
        let built = self.builder.build_state_diff(
            BuilderArgs {
                old_state_root: parent_root,
                new_state_root: block.state_root,
                block_hash: block.hash,
                block_number: block.number,
            },
            params,
        );
        // The parent trie is released regardless of the build outcome; the
        // current root stays pinned as the next event's parent.
        self.chain.unlock_trie(parent_root);
        let state_object = built?;
        let state_object_rlp = alloy_rlp::encode(&state_object);
        debug!(
            number = block.number,
            bytes = state_object_rlp.len(),
            "built state diff object"
        );
        Ok(self.new_payload(state_object_rlp.into(), block, params))
    }

    fn new_payload(&self, state_object_rlp: Bytes, block: &Block, params: &Params) -> Payload {
        let mut payload = Payload::new(state_object_rlp);
        if params.include_block {
            payload.block_rlp = Some(alloy_rlp::encode(block).into());
        }
        if params.include_td {
            payload.total_difficulty = self.chain.total_difficulty_by_hash(block.hash);
        }
        if params.include_receipts {
            let receipts = self.chain.receipts_by_hash(block.hash).unwrap_or_default();
            payload.receipts_rlp = Some(alloy_rlp::encode(&receipts).into());
        }
        payload
    }

    /// Compute a state diff payload at a specific height, bypassing the
    /// subscriber loop. Safe to call concurrently with streaming. Cannot
    /// reach back past the node's pruning horizon.
    pub fn state_diff_at(&self, block_number: u64, params: &Params) -> Result<Payload, ServiceError> {
        let block = self
            .chain
            .block_by_number(block_number)
            .ok_or(ServiceError::BlockNotFound(block_number))?;
        info!(number = block_number, "sending state diff at block");
        let parent_root = if block_number == 0 {
            B256::ZERO
        } else {
            self.chain
                .block_by_hash(block.parent_hash)
                .ok_or(ServiceError::ParentNotFound(block.parent_hash))?
                .state_root
        };
        self.process_state_diff(&block, parent_root, params)
    }

    /// Build the complete state trie payload at a specific height.
    pub fn state_trie_at(&self, block_number: u64, params: &Params) -> Result<Payload, ServiceError> {
        let block = self
            .chain
            .block_by_number(block_number)
            .ok_or(ServiceError::BlockNotFound(block_number))?;
        info!(number = block_number, "sending state trie at block");
        let trie = self.builder.build_state_trie(&block)?;
        let trie_rlp = alloy_rlp::encode(&trie);
        debug!(
            number = block.number,
            bytes = trie_rlp.len(),
            "built state trie object"
        );
        Ok(self.new_payload(trie_rlp.into(), &block, params))
    }

    /// Register a subscriber. Subscriptions with identical params share one
    /// type bucket and receive identical payloads.
    pub fn subscribe(
        &self,
        id: SubscriberId,
        payloads: mpsc::Sender<Payload>,
        quit: mpsc::Sender<bool>,
        params: Params,
    ) {
        info!(%id, "subscribing to the state diff service");
        if self
            .subscriber_count
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("first subscription received; beginning state diff processing");
        }
        let ty = subscription_type(&params);
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.insert(ty, id, Subscription { payloads, quit }, params);
        if let Some(metrics) = &self.metrics {
            metrics.set_subscriptions(subscriptions.len());
        }
    }

    /// Remove a subscriber from every type bucket. Never fails; unknown ids
    /// are a no-op.
    pub fn unsubscribe(&self, id: &str) {
        info!(%id, "unsubscribing from the state diff service");
        let mut subscriptions = self.subscriptions.lock();
        let empty = subscriptions.remove(id);
        if let Some(metrics) = &self.metrics {
            metrics.set_subscriptions(subscriptions.len());
        }
        if empty
            && self
                .subscriber_count
                .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            info!("no more subscriptions; halting state diff processing");
        }
    }

    fn close_all(&self) {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.close_all();
        if let Some(metrics) = &self.metrics {
            metrics.set_subscriptions(0);
        }
    }
}
