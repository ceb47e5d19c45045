//! Single-file JSON document store.
//!
//! The whole keyspace lives in one JSON object on disk and is mirrored in
//! memory. Every mutation writes the full document to a temporary sibling
//! file and renames it over the original, so the file on disk is always a
//! complete document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::{DbError, DocumentBatch, DocumentOp, DocumentStore};

type Documents = BTreeMap<String, serde_json::Value>;

#[derive(Debug)]
pub struct FileDocumentStore {
    path: PathBuf,
    documents: RwLock<Documents>,
    write_lock: Mutex<()>,
    rewrites: AtomicU64,
}

impl FileDocumentStore {
    /// Open (or lazily create) the document file at `path`.
    ///
    /// A missing file is treated as an empty store; the parent directory is
    /// created on first write.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the file exists but cannot be read, or
    /// [`DbError::Serde`] if its contents are not a JSON object.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref().to_path_buf();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Documents::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| DbError::Serde {
                key: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Documents::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            documents: RwLock::new(documents),
            write_lock: Mutex::new(()),
            rewrites: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How many times the file has been rewritten since it was opened.
    #[must_use]
    pub fn rewrites(&self) -> u64 {
        self.rewrites.load(Ordering::Relaxed)
    }

    /// Apply `mutate` to a copy of the documents, persist it, then publish it.
    async fn commit<F, T>(&self, mutate: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Documents) -> T,
    {
        let _guard = self.write_lock.lock().await;

        let mut next = self.documents.read().await.clone();
        let out = mutate(&mut next);
        self.persist(&next).await?;
        self.rewrites.fetch_add(1, Ordering::Relaxed);
        *self.documents.write().await = next;
        Ok(out)
    }

    async fn persist(&self, documents: &Documents) -> Result<(), DbError> {
        let bytes = serde_json::to_vec(documents).map_err(|source| DbError::Serde {
            key: self.path.display().to_string(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, DbError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<(), DbError> {
        self.commit(|docs| {
            docs.insert(key.to_owned(), value);
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, DbError> {
        if !self.documents.read().await.contains_key(key) {
            return Ok(false);
        }
        self.commit(|docs| docs.remove(key).is_some()).await
    }

    async fn apply(&self, batch: DocumentBatch) -> Result<(), DbError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.commit(|docs| {
            for (key, op) in batch {
                match op {
                    DocumentOp::Put(value) => {
                        docs.insert(key, value);
                    }
                    DocumentOp::Delete => {
                        docs.remove(&key);
                    }
                }
            }
        })
        .await
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, DbError> {
        let documents = self.documents.read().await;
        Ok(documents
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), DbError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
