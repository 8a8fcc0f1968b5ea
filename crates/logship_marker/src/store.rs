//! Durable storage of the checkpoint.
//!
//! The marker lives in a dedicated directory under the client's WAL
//! directory:
//!
//! ```text
//! <wal_dir>/
//! └─ remote/               # 0700
//!    ├─ LOCK               # Advisory lock for single-writer
//!    └─ segment_marker     # 0600, one 14-byte record
//! ```
//!
//! Writes go through a temporary file that is synced and renamed over the
//! marker, so a crash leaves either the old or the new record on disk.

use crate::codec;
use crate::config::{CorruptionPolicy, MarkerConfig};
use crate::error::{MarkerError, MarkerResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the marker directory within the WAL directory.
pub const MARKER_DIR_NAME: &str = "remote";
/// Name of the marker file.
pub const MARKER_FILE_NAME: &str = "segment_marker";
/// Permissions of the marker directory on Unix.
pub const MARKER_DIR_MODE: u32 = 0o700;
/// Permissions of the marker file on Unix.
pub const MARKER_FILE_MODE: u32 = 0o600;

const LOCK_FILE_NAME: &str = "LOCK";
const MARKER_TEMP_NAME: &str = "segment_marker.tmp";

/// Returns the marker directory for a WAL directory.
#[must_use]
pub fn marker_dir(base_dir: &Path) -> PathBuf {
    base_dir.join(MARKER_DIR_NAME)
}

/// Returns the marker file path for a WAL directory.
#[must_use]
pub fn marker_path(base_dir: &Path) -> PathBuf {
    marker_dir(base_dir).join(MARKER_FILE_NAME)
}

/// Reads and decodes a marker file without taking the store lock.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn read_marker_file(path: &Path) -> MarkerResult<Option<u64>> {
    match fs::read(path) {
        Ok(data) => codec::decode(&data).map(Some),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Restart-safe storage of exactly one checkpoint.
///
/// # Thread Safety
///
/// Reads of the cached checkpoint may run concurrently with
/// [`mark_segment`](Self::mark_segment). Callers must not issue
/// `mark_segment` from several threads at once; the handler serializes its
/// own calls.
///
/// The store holds an exclusive lock on its directory for its lifetime.
#[derive(Debug)]
pub struct MarkerStore {
    /// Marker directory.
    dir: PathBuf,
    /// Cached checkpoint.
    last: RwLock<Option<u64>>,
    /// Whether to fsync the directory after renames.
    sync_directory: bool,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl MarkerStore {
    /// Opens the marker store under `base_dir` with default configuration.
    ///
    /// # Errors
    ///
    /// See [`open_with_config`](Self::open_with_config).
    pub fn open(base_dir: &Path) -> MarkerResult<Self> {
        Self::open_with_config(base_dir, &MarkerConfig::default())
    }

    /// Opens the marker store under `base_dir`.
    ///
    /// Creates the marker directory if needed and loads the existing marker.
    /// A missing marker file means no checkpoint yet.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The marker directory cannot be created or is not a directory
    /// - Another store holds the lock (returns `MarkerLocked`)
    /// - The marker file is corrupt and the policy is `Fail`
    /// - I/O errors occur
    pub fn open_with_config(base_dir: &Path, config: &MarkerConfig) -> MarkerResult<Self> {
        let dir = marker_dir(base_dir);
        create_marker_dir(&dir)?;

        if !dir.is_dir() {
            return Err(MarkerError::NotADirectory {
                path: dir.display().to_string(),
            });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE_NAME))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(MarkerError::MarkerLocked);
        }

        let path = dir.join(MARKER_FILE_NAME);
        let last = match read_marker_file(&path) {
            Ok(last) => last,
            Err(e) if e.is_corruption() && config.corruption_policy == CorruptionPolicy::Reset => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "discarding unreadable segment marker, WAL will be replayed from the start"
                );
                None
            }
            Err(e) => return Err(e),
        };
        debug!(path = %path.display(), last_marked = ?last, "opened segment marker");

        Ok(Self {
            dir,
            last: RwLock::new(last),
            sync_directory: config.sync_directory,
            _lock_file: lock_file,
        })
    }

    /// Returns the last persisted checkpoint.
    #[must_use]
    pub fn last_marked_segment(&self) -> Option<u64> {
        *self.last.read()
    }

    /// Persists `segment` as the new checkpoint.
    ///
    /// The cached value only changes once the record is durable.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if writing, syncing or renaming fails. The cached
    /// checkpoint is left untouched in that case.
    pub fn mark_segment(&self, segment: u64) -> MarkerResult<()> {
        let record = codec::encode(segment);
        let temp_path = self.dir.join(MARKER_TEMP_NAME);

        let mut file = create_marker_file(&temp_path)?;
        file.write_all(&record)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.marker_path())?;
        if self.sync_directory {
            self.sync_dir()?;
        }

        *self.last.write() = Some(segment);
        Ok(())
    }

    /// Removes the marker file so the next reader starts from the beginning
    /// of the WAL.
    pub fn clear(&self) -> MarkerResult<()> {
        match fs::remove_file(self.marker_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if self.sync_directory {
            self.sync_dir()?;
        }
        *self.last.write() = None;
        Ok(())
    }

    /// Returns the marker directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the marker file path.
    #[must_use]
    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(MARKER_FILE_NAME)
    }

    /// Syncs the marker directory so the rename is durable.
    ///
    /// Windows NTFS journals metadata, so there is nothing to do there.
    #[cfg(unix)]
    fn sync_dir(&self) -> MarkerResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> MarkerResult<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn create_marker_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(MARKER_DIR_MODE)
        .create(dir)
}

#[cfg(not(unix))]
fn create_marker_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn create_marker_file(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(MARKER_FILE_MODE)
        .open(path)?;
    // `mode` only applies on creation; a temp file left by a crash keeps its own.
    file.set_permissions(fs::Permissions::from_mode(MARKER_FILE_MODE))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_marker_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_marker_dir() {
        let temp = tempdir().unwrap();
        let store = MarkerStore::open(temp.path()).unwrap();

        assert!(temp.path().join("remote").is_dir());
        assert_eq!(store.dir(), temp.path().join("remote"));
        assert_eq!(store.last_marked_segment(), None);
        assert!(!store.marker_path().exists());
    }

    #[test]
    fn mark_and_reopen() {
        let temp = tempdir().unwrap();
        {
            let store = MarkerStore::open(temp.path()).unwrap();
            store.mark_segment(12).unwrap();
            assert_eq!(store.last_marked_segment(), Some(12));
        }

        let store = MarkerStore::open(temp.path()).unwrap();
        assert_eq!(store.last_marked_segment(), Some(12));
        assert_eq!(read_marker_file(&store.marker_path()).unwrap(), Some(12));
    }

    #[test]
    fn mark_overwrites_previous_value() {
        let temp = tempdir().unwrap();
        let store = MarkerStore::open(temp.path()).unwrap();
        store.mark_segment(1).unwrap();
        store.mark_segment(2).unwrap();

        let bytes = fs::read(store.marker_path()).unwrap();
        assert_eq!(bytes, codec::encode(2));
        assert!(!store.dir().join(MARKER_TEMP_NAME).exists());
    }

    #[test]
    fn existing_marker_is_loaded() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(marker_dir(temp.path())).unwrap();
        fs::write(marker_path(temp.path()), codec::encode(10)).unwrap();

        let store = MarkerStore::open(temp.path()).unwrap();
        assert_eq!(store.last_marked_segment(), Some(10));
    }

    #[test]
    fn corrupt_marker_fails_by_default() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(marker_dir(temp.path())).unwrap();
        let mut record = codec::encode(10);
        record[5] ^= 0xFF;
        fs::write(marker_path(temp.path()), record).unwrap();

        let result = MarkerStore::open(temp.path());
        assert!(matches!(result, Err(MarkerError::ChecksumMismatch { .. })));
    }

    #[test]
    fn truncated_marker_fails_by_default() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(marker_dir(temp.path())).unwrap();
        fs::write(marker_path(temp.path()), &codec::encode(10)[..6]).unwrap();

        let result = MarkerStore::open(temp.path());
        assert!(matches!(
            result,
            Err(MarkerError::BadLength { actual: 6, .. })
        ));
    }

    #[test]
    fn corrupt_marker_reset_policy() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(marker_dir(temp.path())).unwrap();
        fs::write(marker_path(temp.path()), b"garbage").unwrap();

        let config = MarkerConfig::new().corruption_policy(CorruptionPolicy::Reset);
        let store = MarkerStore::open_with_config(temp.path(), &config).unwrap();
        assert_eq!(store.last_marked_segment(), None);

        store.mark_segment(3).unwrap();
        assert_eq!(read_marker_file(&store.marker_path()).unwrap(), Some(3));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let _store = MarkerStore::open(temp.path()).unwrap();

        let result = MarkerStore::open(temp.path());
        assert!(matches!(result, Err(MarkerError::MarkerLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        {
            let _store = MarkerStore::open(temp.path()).unwrap();
        }
        let _store = MarkerStore::open(temp.path()).unwrap();
    }

    #[test]
    fn clear_removes_marker() {
        let temp = tempdir().unwrap();
        let store = MarkerStore::open(temp.path()).unwrap();
        store.mark_segment(5).unwrap();
        store.clear().unwrap();

        assert_eq!(store.last_marked_segment(), None);
        assert!(!store.marker_path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn marker_dir_blocked_by_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("remote"), b"not a dir").unwrap();

        assert!(MarkerStore::open(temp.path()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unix_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let store = MarkerStore::open(temp.path()).unwrap();
        store.mark_segment(1).unwrap();

        let dir_mode = fs::metadata(store.dir()).unwrap().permissions().mode();
        let file_mode = fs::metadata(store.marker_path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, MARKER_DIR_MODE);
        assert_eq!(file_mode & 0o777, MARKER_FILE_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn stale_temp_file_does_not_leak_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        let store = MarkerStore::open(temp.path()).unwrap();
        let stale = store.dir().join(MARKER_TEMP_NAME);
        fs::write(&stale, b"partial").unwrap();
        fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).unwrap();

        store.mark_segment(3).unwrap();

        let file_mode = fs::metadata(store.marker_path()).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, MARKER_FILE_MODE);
        assert_eq!(read_marker_file(&store.marker_path()).unwrap(), Some(3));
        assert!(!stale.exists());
    }
}
