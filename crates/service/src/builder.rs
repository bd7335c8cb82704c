//! State-diff builder collaborator interface.

use crate::error::ServiceError;
use crate::types::{Block, BuilderArgs, Params, StateObject};

/// Computes state deltas against the node's trie database.
///
/// Implementations may be expensive; the service calls them from its single
/// processing loop and from point-in-time queries, never concurrently for
/// the same subscription type.
pub trait DiffBuilder: Send + Sync {
    /// Build the delta between `args.old_state_root` and
    /// `args.new_state_root`, restricted by `params`' selectors.
    fn build_state_diff(
        &self,
        args: BuilderArgs,
        params: &Params,
    ) -> Result<StateObject, ServiceError>;

    /// Build the complete state trie at `block`.
    fn build_state_trie(&self, block: &Block) -> Result<StateObject, ServiceError>;
}
