//! Keyed storage shared by every participant of a room.
//!
//! Each key holds an opaque string plus a version counter. Writers must
//! name the version they read; a write against a stale version fails with
//! [`StoreError::Conflict`] instead of silently overwriting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Version of a stored entry. An absent key is at version 0.
pub type Version = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub version: Version,
    pub value: String,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("key {key} is locked by another writer")]
    Locked { key: String },
    #[error("version conflict on {key}: expected {expected}, found {found}")]
    Conflict { key: String, expected: Version, found: Version },
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Entry>, StoreError>;

    /// Stores `value` if the key is still at `expected`; returns the new version.
    fn compare_and_swap(&self, key: &str, expected: Version, value: &str) -> Result<Version, StoreError>;
}

/// Store living in process memory. Every session sharing the same
/// `Arc<MemoryStore>` sees the same rooms.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional write, bumping the version. Used to seed rooms and to
    /// play the part of a foreign writer in tests.
    pub fn put(&self, key: &str, value: &str) -> Version {
        let mut entries = self.entries.lock();
        let version = entries.get(key).map_or(0, |e| e.version) + 1;
        entries.insert(key.to_string(), Entry { version, value: value.to_string() });
        version
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn compare_and_swap(&self, key: &str, expected: Version, value: &str) -> Result<Version, StoreError> {
        let mut entries = self.entries.lock();
        let found = entries.get(key).map_or(0, |e| e.version);
        if found != expected {
            return Err(StoreError::Conflict { key: key.to_string(), expected, found });
        }
        let version = found + 1;
        entries.insert(key.to_string(), Entry { version, value: value.to_string() });
        Ok(version)
    }
}

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);
const STALE_LOCK_AGE: Duration = Duration::from_secs(5);

/// Store backed by a directory: `<key>.json` holds the value and
/// `<key>.version` its version. Processes pointed at the same directory
/// share rooms. Writers of one key are serialized with a `<key>.lock` file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", file_stem(key)))
    }

    fn read_version(&self, key: &str) -> Result<Version, StoreError> {
        match fs::read_to_string(self.path(key, "version")) {
            Ok(s) => match s.trim().parse() {
                Ok(v) => Ok(v),
                Err(_) => {
                    log::warn!("unreadable version for {key}, treating as 0");
                    Ok(0)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn lock(&self, key: &str) -> Result<LockGuard, StoreError> {
        let path = self.path(key, "lock");
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(LockGuard { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        log::warn!("breaking stale lock {}", path.display());
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Locked { key: key.to_string() })
    }
}

/// Percent-escapes every byte outside `[A-Za-z0-9_-]`, `%` included, so
/// distinct keys never share a file and never leave the store directory.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            stem.push(b as char);
        } else {
            stem.push_str(&format!("%{b:02X}"));
        }
    }
    stem
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        // Writers rename the value into place before the version, so a value
        // read between two equal version reads is never older than that version.
        for _ in 0..LOCK_ATTEMPTS {
            let before = self.read_version(key)?;
            let value = match fs::read_to_string(self.path(key, "json")) {
                Ok(value) => value,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if self.read_version(key)? == before {
                return Ok(Some(Entry { version: before, value }));
            }
        }
        Err(StoreError::Locked { key: key.to_string() })
    }

    fn compare_and_swap(&self, key: &str, expected: Version, value: &str) -> Result<Version, StoreError> {
        let _guard = self.lock(key)?;
        let found = self.read_version(key)?;
        if found != expected {
            return Err(StoreError::Conflict { key: key.to_string(), expected, found });
        }
        let version = found + 1;
        write_atomic(&self.path(key, "json"), value)?;
        write_atomic(&self.path(key, "version"), &version.to_string())?;
        Ok(version)
    }
}
