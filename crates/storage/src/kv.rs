//! Embedded key-value store abstraction and its write batch.
//!
//! The embedded side of the dual writer is consumed through [`KvStore`];
//! persistent backends plug in behind it. Writes are buffered in a
//! [`KvBatch`], an ordered list of put/delete operations applied atomically
//! by [`KvStore::write`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::StorageError;

/// A write-capable embedded key-value store.
pub trait KvStore: Send + Sync {
    /// Look up a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Apply a batch of operations atomically, in buffer order.
    fn write(&self, batch: &KvBatch) -> Result<(), StorageError>;
}

/// Target of [`KvBatch::iterate`].
///
/// Iteration itself cannot fail; fallible targets wrap themselves in a
/// [`Replayer`], which holds the first error out of band.
pub trait KvWriter {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// A fallible sink that buffered operations can be replayed into.
pub trait KeyValueSink {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
enum KvOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered buffer of operations against the embedded store.
#[derive(Debug, Default)]
pub struct KvBatch {
    ops: Vec<KvOp>,
}

impl KvBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.ops.push(KvOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.ops.push(KvOp::Delete { key: key.to_vec() });
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Discard all buffered operations.
    pub fn reset(&mut self) {
        self.ops.clear();
    }

    /// Drive `writer` with the buffered operations, in order.
    pub fn iterate<W: KvWriter>(&self, writer: &mut W) {
        for op in &self.ops {
            match op {
                KvOp::Put { key, value } => writer.put(key, value),
                KvOp::Delete { key } => writer.delete(key),
            }
        }
    }

    /// Replay the buffered operations into a fallible sink.
    ///
    /// Delivery stops at the first sink error, which is returned after
    /// iteration completes.
    pub fn replay<S: KeyValueSink>(&self, sink: &mut S) -> Result<(), StorageError> {
        let mut replayer = Replayer::new(sink);
        self.iterate(&mut replayer);
        replayer.finish()
    }
}

/// Adapts a fallible [`KeyValueSink`] to the no-error [`KvWriter`] iteration
/// contract. The first sink error makes every later operation a no-op and is
/// surfaced by [`Replayer::finish`].
pub struct Replayer<'a, S: KeyValueSink> {
    sink: &'a mut S,
    failure: Option<StorageError>,
}

impl<'a, S: KeyValueSink> Replayer<'a, S> {
    pub fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            failure: None,
        }
    }

    /// The first error the sink reported, if any.
    pub fn finish(self) -> Result<(), StorageError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<S: KeyValueSink> KvWriter for Replayer<'_, S> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        if self.failure.is_some() {
            return;
        }
        if let Err(err) = self.sink.put(key, value) {
            self.failure = Some(err);
        }
    }

    fn delete(&mut self, key: &[u8]) {
        if self.failure.is_some() {
            return;
        }
        if let Err(err) = self.sink.delete(key) {
            self.failure = Some(err);
        }
    }
}

/// In-memory store for tests and ephemeral runs.
///
/// Clones share the underlying map.
#[derive(Clone, Default)]
pub struct MemoryKv {
    state: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state.read().get(key).cloned())
    }

    fn write(&self, batch: &KvBatch) -> Result<(), StorageError> {
        let mut guard = self.state.write();
        let mut writer = MapWriter { map: &mut *guard };
        batch.iterate(&mut writer);
        Ok(())
    }
}

struct MapWriter<'a> {
    map: &'a mut BTreeMap<Vec<u8>, Vec<u8>>,
}

impl KvWriter for MapWriter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.map.insert(key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, key: &[u8]) {
        self.map.remove(key);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every operation it receives, failing after a set count.
    pub(crate) struct RecordingSink {
        pub ops: Vec<(Vec<u8>, Option<Vec<u8>>)>,
        pub fail_after: Option<usize>,
        pub calls: usize,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self {
                ops: Vec::new(),
                fail_after: None,
                calls: 0,
            }
        }

        pub fn failing_after(calls: usize) -> Self {
            Self {
                ops: Vec::new(),
                fail_after: Some(calls),
                calls: 0,
            }
        }

        fn next(&mut self) -> Result<(), StorageError> {
            if self.fail_after.is_some_and(|limit| self.calls >= limit) {
                return Err(StorageError::Kv("sink refused the write".into()));
            }
            self.calls += 1;
            Ok(())
        }
    }

    impl KeyValueSink for RecordingSink {
        fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
            self.next()?;
            self.ops.push((key.to_vec(), Some(value.to_vec())));
            Ok(())
        }

        fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
            self.next()?;
            self.ops.push((key.to_vec(), None));
            Ok(())
        }
    }

    #[test]
    fn batch_applies_in_order() {
        let store = MemoryKv::new();
        let mut batch = KvBatch::new();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.delete(b"a");
        store.write(&batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn reset_discards_buffered_ops() {
        let store = MemoryKv::new();
        let mut batch = KvBatch::new();
        batch.put(b"a", b"1");
        batch.reset();
        assert!(batch.is_empty());
        store.write(&batch).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn replay_delivers_every_op() {
        let mut batch = KvBatch::new();
        batch.put(b"a", b"1");
        batch.delete(b"b");
        batch.put(b"c", b"3");

        let mut sink = RecordingSink::new();
        batch.replay(&mut sink).unwrap();
        assert_eq!(
            sink.ops,
            vec![
                (b"a".to_vec(), Some(b"1".to_vec())),
                (b"b".to_vec(), None),
                (b"c".to_vec(), Some(b"3".to_vec())),
            ]
        );
    }

    #[test]
    fn replayer_failure_is_sticky() {
        let mut batch = KvBatch::new();
        batch.put(b"a", b"1");
        batch.put(b"b", b"2");
        batch.put(b"c", b"3");

        let mut sink = RecordingSink::failing_after(1);
        let err = batch.replay(&mut sink).unwrap_err();
        assert!(matches!(err, StorageError::Kv(_)));
        // Only the op before the failure reached the sink; the rest were
        // dropped, not retried.
        assert_eq!(sink.ops.len(), 1);
    }
}
