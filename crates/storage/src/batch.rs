//! The dual-backed batch writer.

use std::collections::HashMap;

use rusqlite::{params, Connection, Transaction};
use tracing::debug;

use crate::error::StorageError;
use crate::kv::{KeyValueSink, KvBatch, KvStore};
use crate::schema;
use crate::tables::{resolve_put_key, resolve_table, RoutedKey};

/// A buffered, transactional multi-put/delete over both backends.
///
/// Each key is routed by [`resolve_put_key`]: opaque blobs accumulate in the
/// pending [`KvBatch`], typed rows are upserted into the open relational
/// transaction. [`Batch::write`] commits the transaction and then flushes the
/// embedded batch; [`Batch::replay`] abandons the transaction and re-drives
/// everything buffered into an alternate sink instead.
///
/// The batch holds non-owning references to both backends and owns the
/// transaction and the pending embedded ops. It is not safe for concurrent
/// use; callers serialize.
pub struct Batch<'a, K: KvStore> {
    kv: &'a K,
    sql: &'a Connection,
    tx: Option<Transaction<'a>>,
    pending: KvBatch,
    value_size: usize,
    /// Relational ops buffered in the current transaction window, keyed by
    /// hex-encoded key, so they can be replayed against a sink after a
    /// rollback. Embedded ops are tracked by `pending` itself.
    replay_cache: HashMap<String, Vec<u8>>,
}

impl<'a, K: KvStore> Batch<'a, K> {
    /// Create a batch with a fresh relational transaction.
    pub fn new(kv: &'a K, sql: &'a Connection) -> Result<Self, StorageError> {
        let mut batch = Self {
            kv,
            sql,
            tx: None,
            pending: KvBatch::new(),
            value_size: 0,
            replay_cache: HashMap::new(),
        };
        batch.reset()?;
        Ok(batch)
    }

    /// Queue a put.
    ///
    /// Opaque keys go to the pending embedded batch; typed keys are upserted
    /// into the open transaction immediately. A statement failure leaves the
    /// transaction open; recovery is the caller's, via [`Batch::replay`] or
    /// by dropping the batch.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        match resolve_put_key(key, value)? {
            RoutedKey::Kv => {
                self.pending.put(key, value);
                self.value_size += value.len();
                return Ok(());
            }
            RoutedKey::Header {
                block_number,
                block_hash,
            } => {
                self.open_tx()?.execute(
                    schema::PUT_HEADER,
                    params![key, value, block_number as i64, block_hash],
                )?;
            }
            RoutedKey::HeaderLinked { table, header_id } => {
                let stmt = schema::linked_put(table)
                    .ok_or_else(|| StorageError::unsupported(key))?;
                self.open_tx()?.execute(stmt, params![key, value, header_id])?;
            }
            RoutedKey::Plain { table } => {
                let stmt =
                    schema::plain_put(table).ok_or_else(|| StorageError::unsupported(key))?;
                self.open_tx()?.execute(stmt, params![key, value])?;
            }
        }
        self.replay_cache.insert(hex::encode(key), value.to_vec());
        self.value_size += value.len();
        Ok(())
    }

    /// Queue a delete, symmetric to [`Batch::put`].
    pub fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        let table = resolve_table(key)?;
        let Some(stmt) = schema::delete(table) else {
            self.pending.delete(key);
            self.value_size += 1;
            return Ok(());
        };
        self.open_tx()?.execute(stmt, params![key])?;
        self.replay_cache.remove(&hex::encode(key));
        self.value_size += 1;
        Ok(())
    }

    /// Accumulated byte count of queued payloads since the last reset:
    /// the value length per put plus one per delete.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Commit the relational transaction, then flush the embedded batch.
    ///
    /// A no-op when no transaction is open. A commit failure leaves the
    /// embedded batch unflushed, so the relational store never falls behind
    /// the embedded one. Call [`Batch::reset`] before reuse.
    pub fn write(&mut self) -> Result<(), StorageError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tx.commit()?;
        self.replay_cache = HashMap::new();
        debug!(
            kv_ops = self.pending.len(),
            value_size = self.value_size,
            "committed typed rows; flushing embedded batch"
        );
        self.kv.write(&self.pending)
    }

    /// Abandon the transactional write and re-drive the buffered operations
    /// into `sink` instead.
    ///
    /// The relational transaction is rolled back, the replay cache is applied
    /// as puts (stopping, without unwinding, on the first sink error), and
    /// the embedded batch is then replayed through the sticky-failure
    /// adapter. Cache iteration order is unspecified; sinks must be
    /// order-independent across keys, which the KV contract guarantees.
    pub fn replay<S: KeyValueSink>(&mut self, sink: &mut S) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.rollback();
        }
        for (key, value) in &self.replay_cache {
            let raw = hex::decode(key)?;
            sink.put(&raw, value)?;
        }
        self.replay_cache = HashMap::new();
        debug!(kv_ops = self.pending.len(), "replaying embedded batch");
        self.pending.replay(sink)
    }

    /// Open a fresh transaction window: new relational transaction, empty
    /// embedded batch, empty replay cache, zero value size.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.rollback();
        }
        self.tx = Some(self.sql.unchecked_transaction()?);
        self.pending.reset();
        self.replay_cache = HashMap::new();
        self.value_size = 0;
        Ok(())
    }

    fn open_tx(&self) -> Result<&Transaction<'a>, StorageError> {
        self.tx.as_ref().ok_or(StorageError::TransactionClosed)
    }
}

/// A batch is itself a valid replay sink, so one batch's buffered operations
/// can be re-driven into another (for example against a different backend
/// pair).
impl<K: KvStore> KeyValueSink for Batch<'_, K> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        Batch::put(self, key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        Batch::delete(self, key)
    }
}
