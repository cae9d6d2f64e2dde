//! RocksDB-backed block and document store.
//!
//! Column families:
//! - `blocks`:     ContentBlock JSON, LZ4 compressed, keyed by block id
//! - `documents`:  SuperObject, bincode encoded, keyed by document id
//! - `file_index`: owning document id, keyed by file id (8 bytes big-endian)
//!
//! Block payloads are arbitrary JSON, which bincode cannot carry, so blocks
//! stay JSON and only the fixed-shape document records use bincode.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use folio_core::{BlockStore, ContentBlock, DocumentStore, SuperObject, SyncError};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};

const CF_BLOCKS: &str = "blocks";
const CF_DOCUMENTS: &str = "documents";
const CF_FILE_INDEX: &str = "file_index";

const COLUMN_FAMILIES: &[&str] = &[CF_BLOCKS, CF_DOCUMENTS, CF_FILE_INDEX];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 128MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write (default: false)
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("folio_data"),
            block_cache_size: 128 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    DatabaseError(String),
    SerializationError(String),
    DeserializationError(String),
    CompressionError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::persistence(e)
    }
}

/// RocksDB-backed [`BlockStore`] + [`DocumentStore`].
pub struct RocksStore {
    /// Single-threaded column family mode: column families are fixed at open.
    /// Reads and writes still run concurrently from the blocking pool.
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
    /// Serializes the file-id check-then-insert in `insert_document_if_absent`
    create_lock: Mutex<()>,
    /// Serializes the existence check and removal in `delete_block`
    delete_lock: Mutex<()>,
}

impl RocksStore {
    /// Open (or create) the store at `config.path`.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;
        log::info!("Opened block store at {}", config.path.display());

        Ok(Self {
            db,
            config,
            create_lock: Mutex::new(()),
            delete_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_BLOCKS => {
                // Values are already LZ4 framed
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(4);
            }
            CF_DOCUMENTS | CF_FILE_INDEX => {
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {}
        }

        opts
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    // ─── Encoding ─────────────────────────────────────────────────────

    fn encode_block(block: &ContentBlock) -> Result<Vec<u8>, StoreError> {
        let json = serde_json::to_vec(block)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(lz4_flex::compress_prepend_size(&json))
    }

    fn decode_block(bytes: &[u8]) -> Result<ContentBlock, StoreError> {
        let json = lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| StoreError::CompressionError(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| StoreError::DeserializationError(e.to_string()))
    }

    fn encode_document(doc: &SuperObject) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(doc, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    fn decode_document(bytes: &[u8]) -> Result<SuperObject, StoreError> {
        let (doc, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        Ok(doc)
    }

    fn file_key(file_id: i64) -> [u8; 8] {
        file_id.to_be_bytes()
    }

    fn put_document(&self, batch: &mut WriteBatch, doc: &SuperObject) -> Result<(), StoreError> {
        let cf_docs = self.cf(CF_DOCUMENTS)?;
        let cf_index = self.cf(CF_FILE_INDEX)?;
        batch.put_cf(cf_docs, doc.id.as_bytes(), Self::encode_document(doc)?);
        batch.put_cf(cf_index, Self::file_key(doc.file_id), doc.id.as_bytes());
        Ok(())
    }

    fn load_document(&self, id: &str) -> Result<Option<SuperObject>, StoreError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        self.db
            .get_cf(cf, id.as_bytes())?
            .map(|bytes| Self::decode_document(&bytes))
            .transpose()
    }

    fn lookup_file(&self, file_id: i64) -> Result<Option<SuperObject>, StoreError> {
        let cf = self.cf(CF_FILE_INDEX)?;
        let Some(doc_id) = self.db.get_cf(cf, Self::file_key(file_id))? else {
            return Ok(None);
        };
        let doc_id = String::from_utf8(doc_id)
            .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        self.load_document(&doc_id)
    }

    // ─── Introspection ────────────────────────────────────────────────

    /// Number of stored documents (full scan).
    pub fn document_count(&self) -> Result<usize, StoreError> {
        self.count(CF_DOCUMENTS)
    }

    /// Number of stored blocks, linked or not (full scan).
    pub fn block_count(&self) -> Result<usize, StoreError> {
        self.count(CF_BLOCKS)
    }

    fn count(&self, name: &str) -> Result<usize, StoreError> {
        let cf = self.cf(name)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::DatabaseError(format!("Column family '{name}' not found")))
    }
}

impl BlockStore for RocksStore {
    fn get_block(&self, id: &str) -> folio_core::Result<Option<ContentBlock>> {
        let cf = self.cf(CF_BLOCKS)?;
        let bytes = self.db.get_cf(cf, id.as_bytes()).map_err(StoreError::from)?;
        Ok(bytes.map(|b| Self::decode_block(&b)).transpose()?)
    }

    fn save_block(&self, block: &ContentBlock) -> folio_core::Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BLOCKS)?, block.id.as_bytes(), Self::encode_block(block)?);
        Ok(self.write(batch)?)
    }

    /// Only one of several concurrent deletes of the same id reports `true`.
    fn delete_block(&self, id: &str) -> folio_core::Result<bool> {
        let cf = self.cf(CF_BLOCKS)?;
        let _guard = self.delete_lock.lock().map_err(SyncError::persistence)?;
        let existed = self
            .db
            .get_pinned_cf(cf, id.as_bytes())
            .map_err(StoreError::from)?
            .is_some();
        if existed {
            let mut batch = WriteBatch::default();
            batch.delete_cf(cf, id.as_bytes());
            self.write(batch)?;
        }
        Ok(existed)
    }

    fn contains_block(&self, id: &str) -> folio_core::Result<bool> {
        let cf = self.cf(CF_BLOCKS)?;
        let pinned = self.db.get_pinned_cf(cf, id.as_bytes()).map_err(StoreError::from)?;
        Ok(pinned.is_some())
    }
}

impl DocumentStore for RocksStore {
    fn get_document(&self, id: &str) -> folio_core::Result<Option<SuperObject>> {
        Ok(self.load_document(id)?)
    }

    fn save_document(&self, doc: &SuperObject) -> folio_core::Result<()> {
        let mut batch = WriteBatch::default();
        self.put_document(&mut batch, doc)?;
        Ok(self.write(batch)?)
    }

    fn find_by_file_id(&self, file_id: i64) -> folio_core::Result<Option<SuperObject>> {
        Ok(self.lookup_file(file_id)?)
    }

    fn insert_document_if_absent(&self, doc: &SuperObject) -> folio_core::Result<SuperObject> {
        let _guard = self.create_lock.lock().map_err(SyncError::persistence)?;
        if let Some(existing) = self.lookup_file(doc.file_id)? {
            return Ok(existing);
        }
        let mut batch = WriteBatch::default();
        self.put_document(&mut batch, doc)?;
        self.write(batch)?;
        Ok(doc.clone())
    }
}

fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{BlockData, NoteStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RocksStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        (dir, store)
    }

    fn block(id: &str, text: &str) -> ContentBlock {
        let mut data = BlockData::new();
        data.insert("text".into(), json!(text));
        ContentBlock::new(id, "paragraph", data)
    }

    #[test]
    fn test_open_creates_directory() {
        let (dir, store) = open_temp();
        assert!(store.path().exists());
        assert_eq!(store.path(), dir.path());
        assert_eq!(store.document_count().unwrap(), 0);
    }

    #[test]
    fn test_block_roundtrip_and_delete() {
        let (_dir, store) = open_temp();
        let mut b = block("b1", "hello");
        b.next = Some("b2".into());
        store.save_block(&b).unwrap();

        assert_eq!(store.get_block("b1").unwrap(), Some(b));
        assert!(store.contains_block("b1").unwrap());
        assert!(store.delete_block("b1").unwrap());
        assert!(!store.delete_block("b1").unwrap());
        assert!(store.get_block("b1").unwrap().is_none());
    }

    #[test]
    fn test_document_roundtrip_keeps_all_fields() {
        let (_dir, store) = open_temp();
        let mut doc = SuperObject::new(77, "note", "Roadmap");
        doc.first_item = Some("a".into());
        doc.last_item = Some("c".into());
        doc.checksum = Some(-3);
        doc.template = Some(folio_core::Template {
            kind: Some("report".into()),
            ..Default::default()
        });
        doc.decoration = Some(folio_core::Decoration {
            margin_left: Some(-2),
            ..Default::default()
        });
        store.save_document(&doc).unwrap();

        assert_eq!(store.get_document(&doc.id).unwrap(), Some(doc.clone()));
        assert_eq!(store.find_by_file_id(77).unwrap(), Some(doc));
        assert!(store.find_by_file_id(78).unwrap().is_none());
    }

    #[test]
    fn test_insert_if_absent_is_first_wins() {
        let (_dir, store) = open_temp();
        let first = SuperObject::new(5, "note", "First");
        let second = SuperObject::new(5, "note", "Second");

        assert_eq!(store.insert_document_if_absent(&first).unwrap().id, first.id);
        assert_eq!(store.insert_document_if_absent(&second).unwrap().id, first.id);
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_deletes_report_once() {
        let (_dir, store) = open_temp();
        let store = std::sync::Arc::new(store);

        for round in 0..20 {
            let id = format!("contested-{round}");
            store.save_block(&block(&id, "x")).unwrap();

            let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    let id = id.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.delete_block(&id).unwrap()
                    })
                })
                .collect();

            let removed = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|removed| *removed)
                .count();
            assert_eq!(removed, 1, "round {round}");
            assert!(!store.contains_block(&id).unwrap());
        }
    }

    #[test]
    fn test_chain_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut doc = SuperObject::new(1, "note", "Persisted");
        {
            let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
            let mut a = block("a", "one");
            let mut b = block("b", "two");
            a.next = Some("b".into());
            b.prev = Some("a".into());
            store.save_block(&a).unwrap();
            store.save_block(&b).unwrap();
            doc.first_item = Some("a".into());
            doc.last_item = Some("b".into());
            store.save_document(&doc).unwrap();
            store.flush().unwrap();
        }

        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        let texts: Vec<String> = store
            .blocks_for_document(&doc.id)
            .unwrap()
            .into_iter()
            .map(|b| b.data["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(store.block_count().unwrap(), 2);
    }

    #[test]
    fn test_corrupt_block_is_persistence_error() {
        let (_dir, store) = open_temp();
        let cf = store.cf(CF_BLOCKS).unwrap();
        // Size prefix of 2 followed by a truncated LZ4 token
        store.db.put_cf(cf, b"bad", [2u8, 0, 0, 0, 0xff]).unwrap();

        let err = store.get_block("bad").unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));
    }
}
