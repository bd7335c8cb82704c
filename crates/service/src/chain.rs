//! Chain node collaborator interface.

use alloy_primitives::{B256, U256};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{Block, ChainEvent, Receipt};

/// Terminal failure reported by the node on a chain-event subscription.
#[derive(Debug, Clone, Error)]
#[error("chain event subscription: {0}")]
pub struct ChainFeedError(pub String);

/// The chain node the service consumes.
///
/// Lookups return `None` when the node has pruned or never seen the
/// requested data; the service treats that as a per-event condition, not a
/// failure of the node.
pub trait ChainSource: Send + Sync {
    /// Register `events` to receive chain-head notifications.
    ///
    /// The returned channel reports a terminal subscription failure; the
    /// channel closing also ends the subscription.
    fn subscribe_chain_events(
        &self,
        events: mpsc::Sender<ChainEvent>,
    ) -> mpsc::Receiver<ChainFeedError>;

    fn block_by_hash(&self, hash: B256) -> Option<Block>;

    fn block_by_number(&self, number: u64) -> Option<Block>;

    fn receipts_by_hash(&self, hash: B256) -> Option<Vec<Receipt>>;

    fn total_difficulty_by_hash(&self, hash: B256) -> Option<U256>;

    /// Release the pin on `root`'s trie so the node may reclaim it. The
    /// service calls this for each parent root once its diff is built,
    /// keeping only the newest root pinned as the next parent.
    fn unlock_trie(&self, root: B256);
}
