use crate::error::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::PathBuf;
use tokio::fs;

const DB_SUBDIR: &str = "store_db";
const BLOBS_SUBDIR: &str = "blobs";
const PARTIAL_SUFFIX: &str = ".partial";

/// Persistent, namespaced blob store backed by Sled and the filesystem.
///
/// Blob bytes live on the filesystem under `<base>/blobs/<namespace>/<key>`. A blob
/// only counts as present once its entry record has been committed to the namespace's
/// Sled tree, which happens after the file has been fully written and renamed into place.
/// Small metadata records (e.g. proving-key provenance) live in a second tree.
#[derive(Debug, Clone)] // Clone is cheap because Db is Arc-based
pub struct BlobStore {
    db: Db,
    blobs_path: PathBuf,
    entries: sled::Tree,
    records: sled::Tree,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobEntry {
    len: u64,
}

impl BlobStore {
    /// Creates or opens a `BlobStore` rooted at `base_path` for the given namespace.
    pub fn open(base_path: PathBuf, namespace: &str) -> Result<Self> {
        validate_key(namespace)?;
        let db_path = base_path.join(DB_SUBDIR);
        let blobs_path = base_path.join(BLOBS_SUBDIR).join(namespace);

        std::fs::create_dir_all(&db_path)?;
        std::fs::create_dir_all(&blobs_path)?;

        let db = sled::open(&db_path)
            .map_err(|e| Error::StateError(format!("Failed to open sled DB: {}", e)))?;
        let entries = db.open_tree(format!("{}/entries", namespace))?;
        let records = db.open_tree(format!("{}/records", namespace))?;

        Ok(Self {
            db,
            blobs_path,
            entries,
            records,
        })
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        if !self.entries.contains_key(key.as_bytes())? {
            return Ok(false);
        }
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    /// Reads the blob stored under `key`, if any.
    pub async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        if !self.exists(key).await? {
            return Ok(None);
        }
        match fs::read(self.blob_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            // Removed underneath us; treat as absent
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::IoError(e)),
        }
    }

    /// Writes `data` under `key`, replacing any previous blob.
    pub async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        validate_key(key)?;
        let final_path = self.blob_path(key);
        let partial_path = self.blobs_path.join(format!("{}{}", key, PARTIAL_SUFFIX));

        fs::write(&partial_path, data).await?;
        fs::rename(&partial_path, &final_path).await?;

        let entry = bincode::serialize(&BlobEntry {
            len: data.len() as u64,
        })?;
        self.entries.insert(key.as_bytes(), entry)?;
        self.flush().await
    }

    /// Removes the blob under `key` (explicit eviction). Returns whether anything was removed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let had_entry = self.entries.remove(key.as_bytes())?.is_some();
        self.records.remove(key.as_bytes())?;
        let removed_file = match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(Error::IoError(e)),
        };
        self.flush().await?;
        Ok(had_entry || removed_file)
    }

    /// Reads a small metadata record stored alongside `key`.
    pub fn read_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        match self.records.get(key.as_bytes())? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn write_record<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        validate_key(key)?;
        let raw = bincode::serialize(record)?;
        self.records.insert(key.as_bytes(), raw)?;
        self.flush().await
    }

    /// Drops the metadata record of `key`, leaving the blob in place.
    pub async fn remove_record(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let removed = self.records.remove(key.as_bytes())?.is_some();
        self.flush().await?;
        Ok(removed)
    }

    /// Lists the keys of all committed blobs.
    pub fn keys(&self) -> impl Iterator<Item = Result<String>> + '_ {
        self.entries.iter().keys().map(|key_result| {
            key_result
                .map_err(|e| Error::StateError(format!("Sled key iteration failed: {}", e)))
                .and_then(|key_bytes| {
                    String::from_utf8(key_bytes.to_vec())
                        .map_err(|e| Error::StateError(format!("Invalid UTF8 key in DB: {}", e)))
                })
        })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.blobs_path.join(key)
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| Error::StateError(format!("Failed to flush sled DB: {}", e)))?;
        Ok(())
    }
}

// Keys double as file names
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key.contains("..")
        || key.contains('/')
        || key.contains('\\')
        || key.ends_with(PARTIAL_SUFFIX)
    {
        return Err(Error::InvalidInput(format!("Invalid store key: {:?}", key)));
    }
    Ok(())
}
