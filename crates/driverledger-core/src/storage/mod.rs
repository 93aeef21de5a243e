//! Document storage.
//!
//! Records live in named collections as JSON documents keyed by id. The
//! [`DocumentStore`] trait is the seam to the backing database; the shipped
//! backend is sled, one tree per collection.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend failure.
    #[error("Storage error: {0}")]
    Backend(#[from] sled::Error),

    /// Document (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Named document collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Driver profiles.
    Drivers,
    /// Logged trips.
    Trips,
    /// Logged expenses.
    Expenses,
    /// Savings goals.
    Goals,
    /// Generated reports.
    Reports,
    /// User accounts.
    Users,
}

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::Drivers,
        Self::Trips,
        Self::Expenses,
        Self::Goals,
        Self::Reports,
        Self::Users,
    ];

    /// Collection name as stored.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Drivers => "drivers",
            Self::Trips => "trips",
            Self::Expenses => "expenses",
            Self::Goals => "goals",
            Self::Reports => "reports",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Async key-document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or overwrite a document.
    async fn put(&self, collection: Collection, id: &str, document: Value)
    -> Result<(), StorageError>;

    /// Fetch a document by id.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError>;

    /// List every document in a collection.
    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StorageError>;

    /// Remove a document. Returns whether it existed.
    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StorageError>;
}

/// Document store backed by sled.
pub struct SledDocumentStore {
    db: sled::Db,
}

impl SledDocumentStore {
    /// Open or create a store at the given directory.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a throwaway store that is deleted on drop.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree(&self, collection: Collection) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(collection.name())?)
    }
}

impl fmt::Debug for SledDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledDocumentStore")
            .field("size_on_disk", &self.db.size_on_disk().ok())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DocumentStore for SledDocumentStore {
    async fn put(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&document)?;
        let tree = self.tree(collection)?;
        tree.insert(id.as_bytes(), bytes)?;
        tree.flush_async().await?;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, StorageError> {
        match self.tree(collection)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Value>, StorageError> {
        let mut documents = Vec::new();
        for entry in &self.tree(collection)? {
            let (_, bytes) = entry?;
            documents.push(serde_json::from_slice(&bytes)?);
        }
        Ok(documents)
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StorageError> {
        let tree = self.tree(collection)?;
        let removed = tree.remove(id.as_bytes())?.is_some();
        tree.flush_async().await?;
        Ok(removed)
    }
}

/// A typed record stored in one collection.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection holding this record type.
    const COLLECTION: Collection;

    /// Record id.
    fn id(&self) -> &str;
}

/// Typed view over one collection.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Store a record under its id, overwriting any previous version.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the backend fails.
    pub async fn insert(&self, record: &T) -> Result<(), StorageError> {
        let document = serde_json::to_value(record)?;
        self.store.put(T::COLLECTION, record.id(), document).await
    }

    /// Fetch a record.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the document does not decode.
    pub async fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// List every record. Documents that no longer decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn list(&self) -> Result<Vec<T>, StorageError> {
        let documents = self.store.list(T::COLLECTION).await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value(document) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(collection = %T::COLLECTION, error = %e, "skipping malformed document");
                }
            }
        }
        Ok(records)
    }

    /// List records matching a predicate.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn find(&self, predicate: impl Fn(&T) -> bool + Send) -> Result<Vec<T>, StorageError> {
        let records = self.list().await?;
        Ok(records.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Overwrite an existing record. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn update(&self, record: &T) -> Result<bool, StorageError> {
        if self.store.get(T::COLLECTION, record.id()).await?.is_none() {
            return Ok(false);
        }
        self.insert(record).await?;
        Ok(true)
    }

    /// Delete a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.store.remove(T::COLLECTION, id).await
    }
}

/// Generate a random UUID v4 string.
#[must_use]
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);

    // Set version (4) and variant bits
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}
