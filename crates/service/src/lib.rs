//! State-diffing service for a chain node.
//!
//! Consumes the node's chain-head events, computes the state delta between
//! successive state roots through an external differ, and fans each block's
//! diff out to subscribers as RLP payloads.
//!
//! ```text
//! ┌───────────┐ chain events ┌─────────────────────────────┐
//! │ ChainSource├─────────────►│          Service            │
//! │  (node)   │◄─────────────┤  loop ── DiffBuilder        │
//! └───────────┘ unlock_trie  │    │                        │
//!                            │    ▼ payload per type       │
//!                            │  SubscriptionRegistry       │
//!                            └──────┬───────┬──────────────┘
//!                          try_send │       │ try_send
//!                                   ▼       ▼
//!                              subscriber channels
//! ```
//!
//! Delivery is at-most-once per subscriber per block: payload sends never
//! block, and a subscriber whose channel is full loses that block but stays
//! subscribed. Subscribers with identical [`Params`] share one payload.

pub mod builder;
pub mod chain;
pub mod error;
pub mod metrics;
pub mod service;
pub mod subscriptions;
pub mod types;

pub use builder::DiffBuilder;
pub use chain::{ChainFeedError, ChainSource};
pub use error::ServiceError;
pub use metrics::ServiceMetrics;
pub use service::{Service, ServiceConfig, CHAIN_EVENT_CHANNEL_SIZE};
pub use subscriptions::{subscription_type, SubscriberId, Subscription};
pub use types::{
    Block, BuilderArgs, ChainEvent, Params, Payload, Receipt, StateNode, StateObject,
};
