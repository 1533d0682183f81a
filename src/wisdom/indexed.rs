//! Indexed tier: records in redb plus a token inverted index.
//!
//! Two texts that share no token score exactly the disjoint-text floor, so
//! a query with a threshold above that floor only needs the records that
//! share at least one token with it. Lower thresholds scan the table.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use redb::{
    Database, MultimapTableDefinition, ReadableTable, ReadableTableMetadata, TableDefinition,
};

use super::backend::{BackendTier, WisdomBackend, rank};
use super::{ScoredRecord, StoreResult, WisdomQuery, WisdomRecord};
use crate::error::StoreError;
use crate::similarity::{similarity_floor, tokenize};

pub const FILE_NAME: &str = "wisdom.redb";

/// Insertion id → bincode-encoded [`WisdomRecord`].
const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");

/// Lower-cased token → ids of records whose query contains it.
const TOKENS: MultimapTableDefinition<&str, u64> = MultimapTableDefinition::new("tokens");

pub struct IndexedBackend {
    db: Database,
    path: Option<PathBuf>,
}

impl IndexedBackend {
    /// Open or create `wisdom.redb` in `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Io { source: e })?;
        Self::open_file(&dir.join(FILE_NAME))
    }

    /// Open or create a database at an explicit path.
    pub fn open_file(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;
        let backend = Self {
            db,
            path: Some(path.to_path_buf()),
        };
        backend.ensure_tables()?;
        Ok(backend)
    }

    pub fn in_memory() -> StoreResult<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(|e| StoreError::Redb {
                message: format!("failed to create in-memory redb: {e}"),
            })?;
        let backend = Self { db, path: None };
        backend.ensure_tables()?;
        Ok(backend)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read transactions fail on tables that were never created.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            txn.open_table(RECORDS).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            txn.open_multimap_table(TOKENS).map_err(|e| StoreError::Redb {
                message: format!("open_multimap_table failed: {e}"),
            })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    /// Insert records in one transaction and return the id of the first.
    /// Nothing is visible unless the commit succeeds.
    pub(crate) fn append(&self, records: &[WisdomRecord]) -> StoreResult<u64> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        let first_id;
        {
            let mut table = txn.open_table(RECORDS).map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
            let mut index = txn.open_multimap_table(TOKENS).map_err(|e| StoreError::Redb {
                message: format!("open_multimap_table failed: {e}"),
            })?;
            let mut next_id = table
                .last()
                .map_err(|e| StoreError::Redb {
                    message: format!("last failed: {e}"),
                })?
                .map_or(0, |(key, _)| key.value() + 1);
            first_id = next_id;

            for record in records {
                let bytes = encode(record)?;
                table
                    .insert(next_id, bytes.as_slice())
                    .map_err(|e| StoreError::Redb {
                        message: format!("insert failed: {e}"),
                    })?;
                for token in tokenize(&record.query) {
                    index
                        .insert(token.as_str(), next_id)
                        .map_err(|e| StoreError::Redb {
                            message: format!("index insert failed: {e}"),
                        })?;
                }
                next_id += 1;
            }
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(first_id)
    }

    /// Every `(id, record)` pair in id order.
    pub(crate) fn scan(&self) -> StoreResult<Vec<(u64, WisdomRecord)>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(RECORDS).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let iter = table.iter().map_err(|e| StoreError::Redb {
            message: format!("iter failed: {e}"),
        })?;
        let mut out = Vec::new();
        for entry in iter {
            let (key, value) = entry.map_err(|e| StoreError::Redb {
                message: format!("iteration failed: {e}"),
            })?;
            out.push((key.value(), decode(value.value())?));
        }
        Ok(out)
    }

    /// Fetch specific records; missing ids are skipped.
    pub(crate) fn fetch<I>(&self, ids: I) -> StoreResult<Vec<(u64, WisdomRecord)>>
    where
        I: IntoIterator<Item = u64>,
    {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(RECORDS).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let mut out = Vec::new();
        for id in ids {
            let guard = table.get(id).map_err(|e| StoreError::Redb {
                message: format!("get failed: {e}"),
            })?;
            if let Some(guard) = guard {
                out.push((id, decode(guard.value())?));
            }
        }
        Ok(out)
    }

    /// Ids of records sharing at least one token with `text`, ascending.
    fn candidates(&self, text: &str) -> StoreResult<BTreeSet<u64>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let index = txn.open_multimap_table(TOKENS).map_err(|e| StoreError::Redb {
            message: format!("open_multimap_table failed: {e}"),
        })?;
        let mut ids = BTreeSet::new();
        for token in tokenize(text) {
            let values = index.get(token.as_str()).map_err(|e| StoreError::Redb {
                message: format!("index get failed: {e}"),
            })?;
            for value in values {
                let value = value.map_err(|e| StoreError::Redb {
                    message: format!("index iteration failed: {e}"),
                })?;
                ids.insert(value.value());
            }
        }
        Ok(ids)
    }
}

fn encode(record: &WisdomRecord) -> StoreResult<Vec<u8>> {
    bincode::serialize(record).map_err(|e| StoreError::Serialization {
        message: format!("failed to encode wisdom record: {e}"),
    })
}

fn decode(bytes: &[u8]) -> StoreResult<WisdomRecord> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to decode wisdom record: {e}"),
    })
}

impl WisdomBackend for IndexedBackend {
    fn tier(&self) -> BackendTier {
        BackendTier::Indexed
    }

    fn query(&self, query: &WisdomQuery) -> StoreResult<Vec<ScoredRecord>> {
        let candidates = if query.threshold > similarity_floor() {
            let ids = self.candidates(&query.text)?;
            self.fetch(ids)?
        } else {
            self.scan()?
        };
        Ok(rank(query, candidates))
    }

    fn store(&mut self, record: &WisdomRecord) -> StoreResult<()> {
        self.append(std::slice::from_ref(record)).map(|_| ())
    }

    fn count_records(&self) -> StoreResult<usize> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn.open_table(RECORDS).map_err(|e| StoreError::Redb {
            message: format!("open_table failed: {e}"),
        })?;
        let len = table.len().map_err(|e| StoreError::Redb {
            message: format!("len failed: {e}"),
        })?;
        Ok(len as usize)
    }

    fn export_all(&self) -> StoreResult<Vec<WisdomRecord>> {
        Ok(self.scan()?.into_iter().map(|(_, r)| r).collect())
    }

    fn import_all(&mut self, records: &[WisdomRecord]) -> StoreResult<()> {
        self.append(records).map(|_| ())
    }

    fn destroy(self: Box<Self>) -> StoreResult<()> {
        let IndexedBackend { db, path } = *self;
        drop(db);
        if let Some(path) = path {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for IndexedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedBackend")
            .field("path", &self.path)
            .finish()
    }
}
