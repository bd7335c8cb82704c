//! Key routing: classify raw node keys into storage partitions.
//!
//! Classification is a pure function of the key bytes (and, for puts, the
//! value). It never consults either store, so the same key always routes to
//! the same [`Table`].

use alloy_primitives::keccak256;

use crate::error::StorageError;

/// On-disk key layout of the upstream node.
///
/// Prefixes and lengths are what the classifier dispatches on; the builder
/// functions produce well-formed keys for hosts and tests.
pub mod layout {
    use alloy_primitives::B256;

    /// `'h' + num(8) + hash(32)` -> header RLP
    pub const HEADER_PREFIX: u8 = b'h';
    /// `'h' + num(8) + hash(32) + 't'` -> total difficulty
    pub const TD_SUFFIX: u8 = b't';
    /// `'h' + num(8) + 'n'` -> canonical header hash
    pub const CANONICAL_SUFFIX: u8 = b'n';
    /// `'H' + hash(32)` -> block number
    pub const HEADER_NUMBER_PREFIX: u8 = b'H';
    /// `'b' + num(8) + hash(32)` -> block body RLP
    pub const BODY_PREFIX: u8 = b'b';
    /// `'r' + num(8) + hash(32)` -> receipt list RLP
    pub const RECEIPTS_PREFIX: u8 = b'r';
    /// `'l' + tx hash(32)` -> transaction lookup entry
    pub const TX_LOOKUP_PREFIX: u8 = b'l';
    /// `'B' + bit(2) + section(8) + hash(32)` -> bloom bits
    pub const BLOOM_BITS_PREFIX: u8 = b'B';
    /// `tx hash(32) + 0x01` -> legacy transaction metadata
    pub const TX_META_SUFFIX: u8 = 0x01;
    /// `"secure-key-" + hash(32)` -> trie preimage
    pub const PREIMAGE_PREFIX: &[u8] = b"secure-key-";
    /// `"ethereum-config-" + genesis hash(32)` -> chain config
    pub const CONFIG_PREFIX: &[u8] = b"ethereum-config-";
    /// `"iB" + marker` -> bloom-bits indexer metadata; always shorter than
    /// a bare hash
    pub const BLOOM_INDEX_PREFIX: &[u8] = b"iB";

    pub fn header_key(number: u64, hash: B256) -> Vec<u8> {
        let mut key = vec![HEADER_PREFIX];
        key.extend_from_slice(&number.to_be_bytes());
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn td_key(number: u64, hash: B256) -> Vec<u8> {
        let mut key = header_key(number, hash);
        key.push(TD_SUFFIX);
        key
    }

    pub fn canonical_hash_key(number: u64) -> Vec<u8> {
        let mut key = vec![HEADER_PREFIX];
        key.extend_from_slice(&number.to_be_bytes());
        key.push(CANONICAL_SUFFIX);
        key
    }

    pub fn header_number_key(hash: B256) -> Vec<u8> {
        let mut key = vec![HEADER_NUMBER_PREFIX];
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn body_key(number: u64, hash: B256) -> Vec<u8> {
        let mut key = vec![BODY_PREFIX];
        key.extend_from_slice(&number.to_be_bytes());
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn receipts_key(number: u64, hash: B256) -> Vec<u8> {
        let mut key = vec![RECEIPTS_PREFIX];
        key.extend_from_slice(&number.to_be_bytes());
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn tx_lookup_key(hash: B256) -> Vec<u8> {
        let mut key = vec![TX_LOOKUP_PREFIX];
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn bloom_bits_key(bit: u16, section: u64, hash: B256) -> Vec<u8> {
        let mut key = vec![BLOOM_BITS_PREFIX];
        key.extend_from_slice(&bit.to_be_bytes());
        key.extend_from_slice(&section.to_be_bytes());
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn tx_meta_key(hash: B256) -> Vec<u8> {
        let mut key = hash.to_vec();
        key.push(TX_META_SUFFIX);
        key
    }

    pub fn preimage_key(hash: B256) -> Vec<u8> {
        let mut key = PREIMAGE_PREFIX.to_vec();
        key.extend_from_slice(hash.as_slice());
        key
    }

    pub fn config_key(genesis_hash: B256) -> Vec<u8> {
        let mut key = CONFIG_PREFIX.to_vec();
        key.extend_from_slice(genesis_hash.as_slice());
        key
    }
}

/// The storage partition a key routes to.
///
/// [`Table::KvStore`] means "opaque blob; embedded key-value store". Every
/// other class is a typed row in the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    KvStore,
    Headers,
    Hashes,
    Bodies,
    Receipts,
    TotalDifficulties,
    BloomBits,
    TxLookups,
    Preimages,
    Numbers,
    Configs,
    BloomIndexes,
    TxMeta,
}

impl Table {
    /// Relational table name; `None` for the embedded partition.
    pub fn relation(&self) -> Option<&'static str> {
        Some(match self {
            Table::KvStore => return None,
            Table::Headers => "headers",
            Table::Hashes => "hashes",
            Table::Bodies => "bodies",
            Table::Receipts => "receipts",
            Table::TotalDifficulties => "total_difficulties",
            Table::BloomBits => "bloom_bits",
            Table::TxLookups => "tx_lookups",
            Table::Preimages => "preimages",
            Table::Numbers => "numbers",
            Table::Configs => "configs",
            Table::BloomIndexes => "bloom_indexes",
            Table::TxMeta => "tx_meta",
        })
    }
}

/// A put key after routing, with the extra column values its table needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedKey {
    /// Opaque blob for the embedded store.
    Kv,
    /// Header row: block number from the key, block hash derived from the
    /// header payload.
    Header { block_number: u64, block_hash: String },
    /// Row referencing a header by its hex-encoded hash.
    HeaderLinked { table: Table, header_id: String },
    /// Row with no columns beyond `(key, value)`.
    Plain { table: Table },
}

impl RoutedKey {
    pub fn table(&self) -> Table {
        match self {
            RoutedKey::Kv => Table::KvStore,
            RoutedKey::Header { .. } => Table::Headers,
            RoutedKey::HeaderLinked { table, .. } | RoutedKey::Plain { table } => *table,
        }
    }
}

/// Classify a key for deletion.
///
/// Bare 32-byte keys (trie nodes, code) and short singleton metadata keys are
/// opaque blobs; anything longer that matches no layout rule is unsupported
/// and must be surfaced to the caller.
pub fn resolve_table(key: &[u8]) -> Result<Table, StorageError> {
    if key.starts_with(layout::PREIMAGE_PREFIX) && key.len() == layout::PREIMAGE_PREFIX.len() + 32 {
        return Ok(Table::Preimages);
    }
    if key.starts_with(layout::CONFIG_PREFIX) && key.len() == layout::CONFIG_PREFIX.len() + 32 {
        return Ok(Table::Configs);
    }
    // Bloom-index metadata keys are short (`"iB"` plus a count/section
    // marker, never a full hash). The length guard keeps a bare 32-byte
    // blob that happens to start with those bytes in the opaque partition.
    if key.starts_with(layout::BLOOM_INDEX_PREFIX) && key.len() < 32 {
        return Ok(Table::BloomIndexes);
    }
    match (key.first(), key.len()) {
        (Some(&layout::HEADER_PREFIX), 10) if key[9] == layout::CANONICAL_SUFFIX => {
            Ok(Table::Hashes)
        }
        (Some(&layout::HEADER_PREFIX), 41) => Ok(Table::Headers),
        (Some(&layout::HEADER_PREFIX), 42) if key[41] == layout::TD_SUFFIX => {
            Ok(Table::TotalDifficulties)
        }
        (Some(&layout::HEADER_NUMBER_PREFIX), 33) => Ok(Table::Numbers),
        (Some(&layout::BODY_PREFIX), 41) => Ok(Table::Bodies),
        (Some(&layout::RECEIPTS_PREFIX), 41) => Ok(Table::Receipts),
        (Some(&layout::TX_LOOKUP_PREFIX), 33) => Ok(Table::TxLookups),
        (Some(&layout::BLOOM_BITS_PREFIX), 43) => Ok(Table::BloomBits),
        (_, 33) if key[32] == layout::TX_META_SUFFIX => Ok(Table::TxMeta),
        (_, 32) => Ok(Table::KvStore),
        (_, len) if len < 32 => Ok(Table::KvStore),
        _ => Err(StorageError::unsupported(key)),
    }
}

/// Classify a key for a put and extract the column values its table requires.
///
/// Header rows derive their `block_hash` column from the payload
/// (`keccak256(value)`, the header hash); canonical-hash rows reference the
/// header named by their value; body/receipt/TD/number rows reference the
/// header hash embedded in the key.
pub fn resolve_put_key(key: &[u8], value: &[u8]) -> Result<RoutedKey, StorageError> {
    let table = resolve_table(key)?;
    let routed = match table {
        Table::KvStore => RoutedKey::Kv,
        Table::Headers => RoutedKey::Header {
            block_number: be_u64(&key[1..9]),
            block_hash: hex::encode(keccak256(value)),
        },
        Table::Hashes => RoutedKey::HeaderLinked {
            table,
            header_id: hex::encode(value),
        },
        Table::Bodies | Table::Receipts | Table::TotalDifficulties => RoutedKey::HeaderLinked {
            table,
            header_id: hex::encode(&key[9..41]),
        },
        Table::Numbers => RoutedKey::HeaderLinked {
            table,
            header_id: hex::encode(&key[1..33]),
        },
        Table::BloomBits
        | Table::TxLookups
        | Table::Preimages
        | Table::Configs
        | Table::BloomIndexes
        | Table::TxMeta => RoutedKey::Plain { table },
    };
    Ok(routed)
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}
