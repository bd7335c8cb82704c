//! Chain and payload types for the state-diffing pipeline.
//!
//! These are the storage-shaped forms the service consumes and emits,
//! independent of any RPC surface a host puts in front of them.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// A block header in the form the diff pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Block {
    /// Block number/height.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Parent block hash.
    pub parent_hash: B256,
    /// State root after this block.
    pub state_root: B256,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
}

/// A chain-head notification from the node.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub block: Block,
}

/// Receipt summary carried in payloads when subscribers ask for receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct Receipt {
    pub transaction_hash: B256,
    /// 1 = success, 0 = failure.
    pub status: u64,
    pub cumulative_gas_used: u64,
}

/// Inputs handed to the differ for one block transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderArgs {
    pub old_state_root: B256,
    pub new_state_root: B256,
    pub block_hash: B256,
    pub block_number: u64,
}

/// Subscriber-chosen options.
///
/// The three `include_*` flags control payload assembly; the watch lists are
/// differ-specific selectors the service passes through untouched. The RLP
/// encoding of this struct is canonical: its keccak hash is the subscription
/// type (see [`crate::subscriptions::subscription_type`]).
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, RlpEncodable,
)]
#[serde(rename_all = "camelCase")]
pub struct Params {
    pub include_block: bool,
    pub include_td: bool,
    pub include_receipts: bool,
    /// Accounts the differ should restrict itself to; empty means all.
    #[serde(default)]
    pub watched_addresses: Vec<Address>,
    /// Storage slots the differ should restrict itself to; empty means all.
    #[serde(default)]
    pub watched_storage_slots: Vec<B256>,
}

/// One node of a built state diff or state trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct StateNode {
    /// Trie path of the node.
    pub path: Bytes,
    /// Key of the leaf this node settles, zero for intermediate nodes.
    pub leaf_key: B256,
    /// RLP of the node itself.
    pub value: Bytes,
}

/// The differ's output for one block: the state nodes that changed between
/// the parent root and the block's root (or, for a trie build, the whole
/// trie).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable)]
pub struct StateObject {
    pub block_number: u64,
    pub block_hash: B256,
    pub nodes: Vec<StateNode>,
}

/// The unit delivered to a subscriber for one block. Optional fields are
/// populated per the subscription's [`Params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    /// RLP of the built [`StateObject`].
    pub state_object_rlp: Bytes,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub block_rlp: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_difficulty: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub receipts_rlp: Option<Bytes>,
}

impl Payload {
    /// A payload carrying only the encoded state object.
    pub fn new(state_object_rlp: Bytes) -> Self {
        Self {
            state_object_rlp,
            block_rlp: None,
            total_difficulty: None,
            receipts_rlp: None,
        }
    }
}
