//! Durable per-destination replication knowledge.
//!
//! The session persists [`DestinationKnowledge`] after every acknowledged
//! round and before it updates its in-memory copy, so a restart resumes from
//! the last position the destination confirmed.
//!
//! ```text
//! <dir>/
//! ├─ replication-knowledge.json      # destination id -> knowledge
//! └─ replication-knowledge.json.tmp  # only present during a save
//! ```

use crate::error::{StorageError, StorageResult};
use docrepl_protocol::DestinationKnowledge;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const KNOWLEDGE_FILE: &str = "replication-knowledge.json";
const KNOWLEDGE_TEMP: &str = "replication-knowledge.json.tmp";

/// Persistent storage for destination knowledge.
///
/// Destinations are identified by an opaque string id.
pub trait KnowledgeStore: Send + Sync {
    /// Loads the knowledge saved for `destination`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data cannot be read.
    fn load(&self, destination: &str) -> StorageResult<Option<DestinationKnowledge>>;

    /// Saves the knowledge for `destination`.
    ///
    /// After this returns successfully the knowledge survives process
    /// termination (for durable implementations).
    ///
    /// # Errors
    ///
    /// Returns an error if the knowledge could not be persisted. Previously
    /// saved knowledge is left intact.
    fn save(&self, destination: &str, knowledge: &DestinationKnowledge) -> StorageResult<()>;
}

impl<K: KnowledgeStore + ?Sized> KnowledgeStore for std::sync::Arc<K> {
    fn load(&self, destination: &str) -> StorageResult<Option<DestinationKnowledge>> {
        (**self).load(destination)
    }

    fn save(&self, destination: &str, knowledge: &DestinationKnowledge) -> StorageResult<()> {
        (**self).save(destination, knowledge)
    }
}

/// Non-durable knowledge store for tests.
///
/// Saves can be made to fail to exercise persistence errors.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeStore {
    entries: RwLock<BTreeMap<String, DestinationKnowledge>>,
    fail_saves: AtomicBool,
}

impl MemoryKnowledgeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Release);
    }

    /// Number of destinations with saved knowledge.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing was saved.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KnowledgeStore for MemoryKnowledgeStore {
    fn load(&self, destination: &str) -> StorageResult<Option<DestinationKnowledge>> {
        Ok(self.entries.read().get(destination).cloned())
    }

    fn save(&self, destination: &str, knowledge: &DestinationKnowledge) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::Acquire) {
            return Err(StorageError::unavailable("knowledge store rejected the save"));
        }
        self.entries
            .write()
            .insert(destination.to_string(), knowledge.clone());
        Ok(())
    }
}

/// Knowledge store backed by one JSON file in a directory.
///
/// Every save rewrites the whole file through a temporary file that is
/// synced and then renamed over the previous version, so a crash leaves
/// either the old or the new contents.
#[derive(Debug)]
pub struct FileKnowledgeStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, DestinationKnowledge>>,
}

impl FileKnowledgeStore {
    /// Opens the store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// knowledge file cannot be parsed.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let path = dir.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let file_path = path.join(KNOWLEDGE_FILE);
        let entries = if file_path.exists() {
            let data = fs::read(&file_path)?;
            serde_json::from_slice(&data)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the knowledge file.
    pub fn file_path(&self) -> PathBuf {
        self.path.join(KNOWLEDGE_FILE)
    }

    fn write_file(&self, entries: &BTreeMap<String, DestinationKnowledge>) -> StorageResult<()> {
        let temp_path = self.path.join(KNOWLEDGE_TEMP);

        let data = serde_json::to_vec_pretty(entries)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.file_path())?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl KnowledgeStore for FileKnowledgeStore {
    fn load(&self, destination: &str) -> StorageResult<Option<DestinationKnowledge>> {
        Ok(self.entries.lock().get(destination).cloned())
    }

    fn save(&self, destination: &str, knowledge: &DestinationKnowledge) -> StorageResult<()> {
        let mut entries = self.entries.lock();
        let mut updated = entries.clone();
        updated.insert(destination.to_string(), knowledge.clone());
        self.write_file(&updated)?;
        *entries = updated;
        Ok(())
    }
}
