//! Dual-backed batched writes for ledger key-value data.
//!
//! The node's write traffic is one flat key-value stream, but only part of it
//! is opaque. This crate splits that stream by key shape: trie nodes, contract
//! code and singleton metadata stay blobs in an embedded key-value store,
//! while schema-typed records (headers, bodies, receipts, ...) become rows in
//! a relational database where they can be queried.
//!
//! ```text
//!                    ┌──────────────┐
//!   put/delete ─────►│    Batch     │
//!                    │  (key router)│
//!                    └──────┬───────┘
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!      ┌──────────────┐          ┌──────────────┐
//!      │   KvBatch    │          │ SQLite txn   │
//!      │ (opaque blobs)│         │ (typed rows) │
//!      └──────────────┘          └──────────────┘
//! ```
//!
//! [`Batch`] buffers both sides and commits them together on
//! [`Batch::write`]: the relational transaction first, then the embedded
//! flush. A batch that will not be committed can instead be replayed against
//! any [`KeyValueSink`] with [`Batch::replay`].

pub mod batch;
pub mod error;
pub mod kv;
pub mod schema;
pub mod tables;

pub use batch::Batch;
pub use error::StorageError;
pub use kv::{KeyValueSink, KvBatch, KvStore, KvWriter, MemoryKv, Replayer};
pub use tables::{resolve_put_key, resolve_table, RoutedKey, Table};
