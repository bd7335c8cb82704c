//! Relational schema and statements for the typed tables.
//!
//! Every typed table carries `(key, value)` with `key` as primary key;
//! header rows add the block number and hash, header-linked rows add the
//! hex-encoded hash of the header row they reference. All puts are
//! idempotent upserts and all deletes take only the key, so replaying a
//! batch is safe.

use rusqlite::Connection;

use crate::tables::Table;

/// Idempotent DDL for the typed tables.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS headers (
    key          BLOB PRIMARY KEY,
    value        BLOB NOT NULL,
    block_number INTEGER NOT NULL,
    block_hash   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS hashes (
    key       BLOB PRIMARY KEY,
    value     BLOB NOT NULL,
    header_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS bodies (
    key       BLOB PRIMARY KEY,
    value     BLOB NOT NULL,
    header_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS receipts (
    key       BLOB PRIMARY KEY,
    value     BLOB NOT NULL,
    header_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS total_difficulties (
    key       BLOB PRIMARY KEY,
    value     BLOB NOT NULL,
    header_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS numbers (
    key       BLOB PRIMARY KEY,
    value     BLOB NOT NULL,
    header_id TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS bloom_bits (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS tx_lookups (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS preimages (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS configs (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS bloom_indexes (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS tx_meta (
    key   BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
";

/// Create the typed tables if they do not exist.
pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

pub(crate) const PUT_HEADER: &str = "INSERT INTO headers (key, value, block_number, block_hash) \
     VALUES (?1, ?2, ?3, ?4) \
     ON CONFLICT (key) DO UPDATE \
     SET value = excluded.value, block_number = excluded.block_number, \
         block_hash = excluded.block_hash";

/// Upsert statement for a header-linked table.
pub(crate) fn linked_put(table: Table) -> Option<&'static str> {
    Some(match table {
        Table::Hashes => {
            "INSERT INTO hashes (key, value, header_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, header_id = excluded.header_id"
        }
        Table::Bodies => {
            "INSERT INTO bodies (key, value, header_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, header_id = excluded.header_id"
        }
        Table::Receipts => {
            "INSERT INTO receipts (key, value, header_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, header_id = excluded.header_id"
        }
        Table::TotalDifficulties => {
            "INSERT INTO total_difficulties (key, value, header_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, header_id = excluded.header_id"
        }
        Table::Numbers => {
            "INSERT INTO numbers (key, value, header_id) VALUES (?1, ?2, ?3) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, header_id = excluded.header_id"
        }
        _ => return None,
    })
}

/// Upsert statement for a table with no extra columns.
pub(crate) fn plain_put(table: Table) -> Option<&'static str> {
    Some(match table {
        Table::BloomBits => {
            "INSERT INTO bloom_bits (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value"
        }
        Table::TxLookups => {
            "INSERT INTO tx_lookups (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value"
        }
        Table::Preimages => {
            "INSERT INTO preimages (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value"
        }
        Table::Configs => {
            "INSERT INTO configs (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value"
        }
        Table::BloomIndexes => {
            "INSERT INTO bloom_indexes (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value"
        }
        Table::TxMeta => {
            "INSERT INTO tx_meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT (key) DO UPDATE SET value = excluded.value"
        }
        _ => return None,
    })
}

/// Delete statement for a typed table; `None` for the embedded partition.
pub(crate) fn delete(table: Table) -> Option<&'static str> {
    Some(match table {
        Table::KvStore => return None,
        Table::Headers => "DELETE FROM headers WHERE key = ?1",
        Table::Hashes => "DELETE FROM hashes WHERE key = ?1",
        Table::Bodies => "DELETE FROM bodies WHERE key = ?1",
        Table::Receipts => "DELETE FROM receipts WHERE key = ?1",
        Table::TotalDifficulties => "DELETE FROM total_difficulties WHERE key = ?1",
        Table::BloomBits => "DELETE FROM bloom_bits WHERE key = ?1",
        Table::TxLookups => "DELETE FROM tx_lookups WHERE key = ?1",
        Table::Preimages => "DELETE FROM preimages WHERE key = ?1",
        Table::Numbers => "DELETE FROM numbers WHERE key = ?1",
        Table::Configs => "DELETE FROM configs WHERE key = ?1",
        Table::BloomIndexes => "DELETE FROM bloom_indexes WHERE key = ?1",
        Table::TxMeta => "DELETE FROM tx_meta WHERE key = ?1",
    })
}
