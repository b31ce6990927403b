//! Filesystem Backend Module
//!
//! One file per key. Each record starts with a single JSON header line
//! carrying the deadline, followed by the raw value bytes, so expiry is
//! decided without reading the value.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{AsyncBackend, Backend};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::ttl::Ttl;

const RECORD_EXTENSION: &str = "cache";
const TEMP_PREFIX: &str = ".pocket-";
/// Headers are a few dozen bytes; anything longer without a newline is damage.
const MAX_HEADER_LEN: u64 = 4096;

/// On-disk record header (Unix milliseconds).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RecordHeader {
    created_at: i64,
    expires_at: Option<i64>,
}

impl RecordHeader {
    fn new(ttl: Ttl) -> Self {
        let now = now_ms();
        let expires_at = ttl
            .as_millis_ceil()
            .map(|ms| now.saturating_add(i64::try_from(ms).unwrap_or(i64::MAX)));
        Self {
            created_at: now,
            expires_at,
        }
    }

    fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Result of reading a record header.
enum Header {
    Missing,
    Corrupt,
    Valid(RecordHeader, BufReader<File>),
}

#[derive(Debug)]
struct FsInner {
    dir: PathBuf,
    file_mode: u32,
    /// Serializes renames into place with stale-record removal.
    rename_lock: Mutex<()>,
}

// == Builder ==
/// Configures and creates a [`FileSystemBackend`].
#[derive(Debug, Clone)]
pub struct FileSystemBackendBuilder {
    dir: PathBuf,
    create_dir: bool,
    dir_mode: u32,
    file_mode: u32,
}

impl FileSystemBackendBuilder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            create_dir: true,
            dir_mode: 0o700,
            file_mode: 0o600,
        }
    }

    /// Whether a missing directory is created (default: true).
    pub fn create_dir(mut self, create: bool) -> Self {
        self.create_dir = create;
        self
    }

    /// Permission bits for a created directory (default: 0o700). Unix only.
    pub fn dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Permission bits for record files (default: 0o600). Unix only.
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    pub fn build(self) -> Result<FileSystemBackend> {
        if !self.dir.exists() {
            if !self.create_dir {
                return Err(CacheError::Config(format!(
                    "Cache directory {} does not exist",
                    self.dir.display()
                )));
            }
            create_dir_with_mode(&self.dir, self.dir_mode)?;
            info!("Created cache directory {}", self.dir.display());
        } else if !self.dir.is_dir() {
            return Err(CacheError::Config(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }

        Ok(FileSystemBackend {
            inner: Arc::new(FsInner {
                dir: self.dir,
                file_mode: self.file_mode,
                rename_lock: Mutex::new(()),
            }),
        })
    }
}

#[cfg(unix)]
fn create_dir_with_mode(dir: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_dir_with_mode(dir: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn apply_file_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_file_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}

// == Filesystem Backend ==
/// Directory-backed store. Cheap to clone; clones share the directory.
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    inner: Arc<FsInner>,
}

impl FileSystemBackend {
    /// Opens `dir` with default settings, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        FileSystemBackendBuilder::new(dir).build()
    }

    pub fn builder(dir: impl Into<PathBuf>) -> FileSystemBackendBuilder {
        FileSystemBackendBuilder::new(dir)
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        FileSystemBackendBuilder::new(&config.cache_dir)
            .dir_mode(config.dir_mode)
            .file_mode(config.file_mode)
            .build()
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Path of the record for `key`. File names are a hash of the key so
    /// arbitrary keys map to safe, fixed-length names.
    pub fn record_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.inner
            .dir
            .join(format!("{}.{}", hex::encode(digest), RECORD_EXTENSION))
    }

    // == Purge Expired ==
    /// Removes every expired or unreadable record. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut removed = 0;

        for path in self.record_files()? {
            if self.remove_if_stale(&path)? {
                removed += 1;
            }
        }

        debug!("Purged {} expired records from {}", removed, self.dir().display());
        Ok(removed)
    }

    /// Removes the record at `path` if it is still corrupt or expired.
    ///
    /// The header is read again under the rename lock, so a record renamed
    /// into place after the caller's own read is never removed.
    fn remove_if_stale(&self, path: &Path) -> Result<bool> {
        let _guard = self.inner.rename_lock.lock();
        let stale = match read_header(path)? {
            Header::Missing => false,
            Header::Corrupt => true,
            Header::Valid(header, _) => header.is_expired_at(now_ms()),
        };
        if stale {
            remove_record(path)?;
        }
        Ok(stale)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.inner.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn write_record(&self, path: &Path, header: &RecordHeader, value: &[u8]) -> Result<()> {
        let header_line = serde_json::to_vec(header)
            .map_err(|e| CacheError::Serialization(format!("Failed to encode header: {}", e)))?;

        // Write beside the target and rename into place so readers never see
        // a partial record.
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.inner.dir)?;
        tmp.write_all(&header_line)?;
        tmp.write_all(b"\n")?;
        tmp.write_all(value)?;
        tmp.flush()?;
        apply_file_mode(tmp.as_file(), self.inner.file_mode)?;

        let _guard = self.inner.rename_lock.lock();
        tmp.persist(path).map_err(|e| CacheError::from(e.error))?;
        Ok(())
    }
}

fn read_header(path: &Path) -> Result<Header> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Header::Missing),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    reader
        .by_ref()
        .take(MAX_HEADER_LEN)
        .read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Ok(Header::Corrupt);
    }

    match serde_json::from_slice::<RecordHeader>(&line[..line.len() - 1]) {
        Ok(header) => Ok(Header::Valid(header, reader)),
        Err(_) => Ok(Header::Corrupt),
    }
}

fn remove_record(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl Backend for FileSystemBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(key);

        match read_header(&path)? {
            Header::Missing => Ok(None),
            Header::Corrupt => {
                if self.remove_if_stale(&path)? {
                    warn!("Removed corrupt cache record for key={}", key);
                }
                Ok(None)
            }
            Header::Valid(header, _) if header.is_expired_at(now_ms()) => {
                debug!("Expired record for key={}", key);
                self.remove_if_stale(&path)?;
                Ok(None)
            }
            Header::Valid(_, mut reader) => {
                let mut value = Vec::new();
                reader.read_to_end(&mut value)?;
                Ok(Some(value))
            }
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        debug!("SET key={}, size={}, ttl={:?}", key, value.len(), ttl.duration());
        let path = self.record_path(key);
        self.write_record(&path, &RecordHeader::new(ttl), &value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        debug!("DELETE key={}", key);
        remove_record(&self.record_path(key))
    }

    fn clear(&self) -> Result<()> {
        let files = self.record_files()?;
        let count = files.len();
        for path in files {
            remove_record(&path)?;
        }
        debug!("CLEAR removed {} records from {}", count, self.dir().display());
        Ok(())
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CacheError::BackendUnavailable(format!("Blocking file task failed: {}", e)))?
}

#[async_trait]
impl AsyncBackend for FileSystemBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let backend = self.clone();
        let key = key.to_string();
        run_blocking(move || Backend::get(&backend, &key)).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        run_blocking(move || Backend::set(&backend, &key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        run_blocking(move || Backend::delete(&backend, &key)).await
    }

    async fn clear(&self) -> Result<()> {
        let backend = self.clone();
        run_blocking(move || Backend::clear(&backend)).await
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn ttl_ms(ms: i64) -> Ttl {
        Ttl::from_millis(ms).unwrap()
    }

    fn backend() -> (TempDir, FileSystemBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FileSystemBackend::new(dir.path()).unwrap();
        (dir, backend)
    }

    #[test]
    fn test_set_and_get() {
        let (_dir, backend) = backend();

        Backend::set(&backend, "key1", b"value1".to_vec(), ttl_ms(60_000)).unwrap();
        assert_eq!(Backend::get(&backend, "key1").unwrap(), Some(b"value1".to_vec()));
        assert!(backend.record_path("key1").exists());
    }

    #[test]
    fn test_binary_value_with_newlines() {
        let (_dir, backend) = backend();
        let value = vec![b'\n', 0, 255, b'\n', b'{'];

        Backend::set(&backend, "bin", value.clone(), Ttl::NEVER).unwrap();
        assert_eq!(Backend::get(&backend, "bin").unwrap(), Some(value));
    }

    #[test]
    fn test_get_missing() {
        let (_dir, backend) = backend();
        assert_eq!(Backend::get(&backend, "nope").unwrap(), None);
    }

    #[test]
    fn test_expired_record_removed_on_read() {
        let (_dir, backend) = backend();

        Backend::set(&backend, "short", b"v".to_vec(), ttl_ms(40)).unwrap();
        sleep(Duration::from_millis(70));

        assert_eq!(Backend::get(&backend, "short").unwrap(), None);
        assert!(!backend.record_path("short").exists());
    }

    #[test]
    fn test_overwrite() {
        let (_dir, backend) = backend();

        Backend::set(&backend, "k", b"one".to_vec(), ttl_ms(40)).unwrap();
        Backend::set(&backend, "k", b"two".to_vec(), Ttl::NEVER).unwrap();
        sleep(Duration::from_millis(70));

        assert_eq!(Backend::get(&backend, "k").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_delete_and_delete_missing() {
        let (_dir, backend) = backend();

        Backend::set(&backend, "k", b"v".to_vec(), Ttl::NEVER).unwrap();
        Backend::delete(&backend, "k").unwrap();
        assert_eq!(Backend::get(&backend, "k").unwrap(), None);
        assert!(Backend::delete(&backend, "k").is_ok());
    }

    #[test]
    fn test_clear_only_removes_records() {
        let (dir, backend) = backend();
        let unrelated = dir.path().join("notes.txt");
        fs::write(&unrelated, b"keep me").unwrap();

        Backend::set(&backend, "a", b"1".to_vec(), Ttl::NEVER).unwrap();
        Backend::set(&backend, "b", b"2".to_vec(), Ttl::NEVER).unwrap();
        Backend::clear(&backend).unwrap();

        assert_eq!(Backend::get(&backend, "a").unwrap(), None);
        assert_eq!(Backend::get(&backend, "b").unwrap(), None);
        assert!(unrelated.exists());
    }

    #[test]
    fn test_clear_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone");
        let backend = FileSystemBackend::new(&path).unwrap();
        fs::remove_dir(&path).unwrap();

        assert!(Backend::clear(&backend).is_ok());
    }

    #[test]
    fn test_corrupt_record_is_miss() {
        let (_dir, backend) = backend();
        fs::write(backend.record_path("bad"), b"garbage without header").unwrap();

        assert_eq!(Backend::get(&backend, "bad").unwrap(), None);
        assert!(!backend.record_path("bad").exists());
    }

    #[test]
    fn test_oversized_header_is_corrupt() {
        let (_dir, backend) = backend();
        let path = backend.record_path("big");
        fs::write(&path, vec![b'x'; 10_000]).unwrap();

        assert_eq!(Backend::get(&backend, "big").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_long_value_after_header_is_read_whole() {
        let (_dir, backend) = backend();
        let value = vec![b'v'; 3 * MAX_HEADER_LEN as usize];

        Backend::set(&backend, "long", value.clone(), Ttl::NEVER).unwrap();
        assert_eq!(Backend::get(&backend, "long").unwrap(), Some(value));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let (_dir, backend) = backend();
        let ttl = Ttl::new(Duration::MAX).unwrap();

        Backend::set(&backend, "forever", b"v".to_vec(), ttl).unwrap();
        assert_eq!(Backend::get(&backend, "forever").unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.purge_expired().unwrap(), 0);

        let raw = fs::read(backend.record_path("forever")).unwrap();
        let newline = raw.iter().position(|b| *b == b'\n').unwrap();
        let header: RecordHeader = serde_json::from_slice(&raw[..newline]).unwrap();
        assert_eq!(header.expires_at, Some(i64::MAX));
    }

    #[test]
    fn test_stale_removal_rechecks_replaced_record() {
        let (_dir, backend) = backend();
        let path = backend.record_path("k");

        Backend::set(&backend, "k", b"old".to_vec(), ttl_ms(1)).unwrap();
        sleep(Duration::from_millis(5));
        // Replaced after a reader saw the expired header
        Backend::set(&backend, "k", b"new".to_vec(), Ttl::NEVER).unwrap();

        assert!(!backend.remove_if_stale(&path).unwrap());
        assert_eq!(Backend::get(&backend, "k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_lazy_expiry_never_deletes_concurrent_write() {
        let (_dir, backend) = backend();

        for round in 0..200 {
            Backend::set(&backend, "k", b"old".to_vec(), ttl_ms(1)).unwrap();
            sleep(Duration::from_millis(2));

            std::thread::scope(|s| {
                let reader = s.spawn(|| Backend::get(&backend, "k"));
                let purger = s.spawn(|| backend.purge_expired());
                Backend::set(&backend, "k", b"new".to_vec(), Ttl::NEVER).unwrap();
                reader.join().unwrap().unwrap();
                purger.join().unwrap().unwrap();
            });

            assert_eq!(
                Backend::get(&backend, "k").unwrap(),
                Some(b"new".to_vec()),
                "fresh record lost in round {}",
                round
            );
        }
    }

    #[test]
    fn test_header_readable_without_value() {
        let (_dir, backend) = backend();
        Backend::set(&backend, "k", b"payload".to_vec(), ttl_ms(60_000)).unwrap();

        let raw = fs::read(backend.record_path("k")).unwrap();
        let newline = raw.iter().position(|b| *b == b'\n').unwrap();
        let header: RecordHeader = serde_json::from_slice(&raw[..newline]).unwrap();

        assert!(header.expires_at.unwrap() > header.created_at);
        assert_eq!(&raw[newline + 1..], b"payload");
    }

    #[test]
    fn test_purge_expired() {
        let (_dir, backend) = backend();

        Backend::set(&backend, "old", b"v".to_vec(), ttl_ms(40)).unwrap();
        Backend::set(&backend, "new", b"v".to_vec(), Ttl::NEVER).unwrap();
        sleep(Duration::from_millis(70));

        assert_eq!(backend.purge_expired().unwrap(), 1);
        assert!(!backend.record_path("old").exists());
        assert!(backend.record_path("new").exists());
    }

    #[test]
    fn test_missing_dir_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let result = FileSystemBackend::builder(dir.path().join("absent"))
            .create_dir(false)
            .build();

        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_record_path_is_stable() {
        let (_dir, backend) = backend();
        let path = backend.record_path("user:1");
        let name = path.file_name().unwrap().to_str().unwrap();

        assert_eq!(path, backend.record_path("user:1"));
        assert_ne!(path, backend.record_path("user:2"));
        assert_eq!(name.len(), 64 + ".cache".len());
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let dir = root.path().join("private");
        let backend = FileSystemBackend::builder(&dir)
            .dir_mode(0o700)
            .file_mode(0o600)
            .build()
            .unwrap();

        Backend::set(&backend, "k", b"v".to_vec(), Ttl::NEVER).unwrap();

        let dir_mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        let file_mode = fs::metadata(backend.record_path("k"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let (_dir, backend) = backend();

        AsyncBackend::set(&backend, "k", b"v".to_vec(), Ttl::NEVER)
            .await
            .unwrap();
        assert_eq!(
            AsyncBackend::get(&backend, "k").await.unwrap(),
            Some(b"v".to_vec())
        );
        AsyncBackend::clear(&backend).await.unwrap();
        assert_eq!(AsyncBackend::get(&backend, "k").await.unwrap(), None);
    }
}
