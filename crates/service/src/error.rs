//! Error types for the state-diffing service.

use alloy_primitives::B256;
use thiserror::Error;

/// Errors surfaced by the service's point-in-time queries and the diff
/// pipeline.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The chain could not produce the requested block.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// The chain could not produce the parent of the requested block.
    #[error("parent block {0} not found")]
    ParentNotFound(B256),

    /// The diff builder failed for this transition.
    #[error("diff builder: {0}")]
    Builder(String),
}
