//! Ledger persistence layer
//!
//! Provides a [`Cache`] backed by JSON files under a data directory:
//! - `blocks/<hash>.json` - one file per block, named by hex hash
//! - `heads/<channel>.json` - head reference per channel
//! - `entries/<channel>/<record hash>.json` - records waiting to be mined
//!
//! Channel names are hex-encoded in paths. Every write goes to a temporary
//! file first and is then renamed into place.

use crate::core::{Block, BlockEntry, Reference};
use crate::storage::cache::{Cache, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".alias_data"),
        }
    }
}

/// File-backed ledger store
pub struct FileCache {
    config: StorageConfig,
}

impl FileCache {
    /// Create a new file store, creating its directories
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(config.data_dir.join("blocks"))?;
        fs::create_dir_all(config.data_dir.join("heads"))?;
        fs::create_dir_all(config.data_dir.join("entries"))?;
        Ok(Self { config })
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn block_path(&self, hash: &[u8]) -> PathBuf {
        self.config
            .data_dir
            .join("blocks")
            .join(format!("{}.json", hex::encode(hash)))
    }

    fn head_path(&self, channel: &str) -> PathBuf {
        self.config
            .data_dir
            .join("heads")
            .join(format!("{}.json", hex::encode(channel)))
    }

    fn entries_dir(&self, channel: &str) -> PathBuf {
        self.config.data_dir.join("entries").join(hex::encode(channel))
    }

    fn entry_path(&self, channel: &str, record_hash: &[u8]) -> PathBuf {
        self.entries_dir(channel)
            .join(format!("{}.json", hex::encode(record_hash)))
    }
}

/// Write JSON to a temporary file, then rename it into place
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let temp_path = path.with_extension("tmp");
    let file = fs::File::create(&temp_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer(writer, value)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(Some(serde_json::from_reader(reader)?))
}

impl Cache for FileCache {
    fn get_head(&self, channel: &str) -> Result<Option<Reference>, StorageError> {
        read_json(&self.head_path(channel))
    }

    fn put_head(&self, channel: &str, reference: &Reference) -> Result<(), StorageError> {
        write_json(&self.head_path(channel), reference)
    }

    fn get_block(&self, hash: &[u8]) -> Result<Option<Block>, StorageError> {
        read_json(&self.block_path(hash))
    }

    fn put_block(&self, hash: &[u8], block: &Block) -> Result<(), StorageError> {
        write_json(&self.block_path(hash), block)
    }

    fn get_block_entries(&self, channel: &str) -> Result<Vec<BlockEntry>, StorageError> {
        let dir = self.entries_dir(channel);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&dir)? {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(entry) = read_json::<BlockEntry>(&path)? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.record.timestamp);
        Ok(entries)
    }

    fn put_block_entry(&self, channel: &str, entry: &BlockEntry) -> Result<(), StorageError> {
        fs::create_dir_all(self.entries_dir(channel))?;
        write_json(&self.entry_path(channel, &entry.record_hash), entry)
    }

    fn remove_block_entry(&self, channel: &str, record_hash: &[u8]) -> Result<(), StorageError> {
        let path = self.entry_path(channel, record_hash);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;
    use crate::crypto::SignatureAlgorithm;
    use crate::storage::write_record;
    use std::collections::BTreeMap;

    fn file_cache(dir: &tempfile::TempDir) -> FileCache {
        FileCache::new(StorageConfig {
            data_dir: dir.path().to_path_buf(),
        })
        .unwrap()
    }

    fn record(creator: &str, timestamp: u64) -> Record {
        Record {
            timestamp,
            creator: creator.to_string(),
            payload: b"{}".to_vec(),
            encryption_algorithm: Default::default(),
            signature: vec![1, 2],
            signature_algorithm: SignatureAlgorithm::Sha512WithRsaPss,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn test_blocks_and_heads_persist() {
        let temp_dir = tempfile::tempdir().unwrap();
        let block = Block::new(7, "Alias", None, "miner", vec![]);
        let hash = block.hash().unwrap();
        let reference = Reference {
            timestamp: 7,
            channel_name: "Alias".to_string(),
            block_hash: Some(hash.clone()),
            record_hash: None,
        };

        {
            let cache = file_cache(&temp_dir);
            cache.put_block(&hash, &block).unwrap();
            cache.put_head("Alias", &reference).unwrap();
        }

        // Reopen
        let cache = file_cache(&temp_dir);
        assert_eq!(cache.get_block(&hash).unwrap(), Some(block));
        assert_eq!(cache.get_head("Alias").unwrap(), Some(reference));
        assert!(cache.get_block(&[0u8; 64]).unwrap().is_none());
        assert!(cache.get_head("Other").unwrap().is_none());
    }

    #[test]
    fn test_pending_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = file_cache(&temp_dir);

        write_record("Alias", &cache, record("Bob", 20)).unwrap();
        let alice = write_record("Alias", &cache, record("Alice", 10)).unwrap();

        let entries = cache.get_block_entries("Alias").unwrap();
        let creators: Vec<&str> = entries.iter().map(|e| e.record.creator.as_str()).collect();
        assert_eq!(creators, vec!["Alice", "Bob"]);

        cache
            .remove_block_entry("Alias", alice.record_hash.as_deref().unwrap())
            .unwrap();
        assert_eq!(cache.get_block_entries("Alias").unwrap().len(), 1);
        assert!(cache.get_block_entries("Other").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_block_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let cache = file_cache(&temp_dir);
        let hash = vec![0xab; 64];
        fs::write(cache.block_path(&hash), b"{not json").unwrap();
        assert!(matches!(
            cache.get_block(&hash),
            Err(StorageError::SerializationError(_))
        ));
    }
}
