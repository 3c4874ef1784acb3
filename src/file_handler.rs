use crate::config::SessionConfig;
use crate::session_id::SessionId;
use crate::storage_handler::{oldest_kept, require_configuration, storage_key, StorageHandler};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// # filesystem storage handler
/// Stores every session in its own file `<save path>/<prefix><id>`.
///
/// Reads take a shared lock and writes take an exclusive lock on the session file, held only
/// for the I/O itself, so concurrent requests for the same session never observe a partially
/// written payload. The locks are advisory: other programs touching the directory must use
/// the same locking to be safe.
///
/// On Unix, the directory is created with mode `0o700` and session files with mode `0o600`.
#[derive(Debug, Clone, Default)]
pub struct FileHandler {
    config: Option<Arc<SessionConfig>>,
    directory: Option<PathBuf>,
}

/// Releases the advisory lock when dropped, on every exit path.
struct FileLock<'file> {
    file: &'file File,
}

impl<'file> FileLock<'file> {
    fn shared(file: &'file File) -> io::Result<Self> {
        FileExt::lock_shared(file)?;
        Ok(Self { file })
    }

    fn exclusive(file: &'file File) -> io::Result<Self> {
        FileExt::lock_exclusive(file)?;
        Ok(Self { file })
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(self.file) {
            log::warn!("Failed to unlock session file: {error}");
        }
    }
}

fn session_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn create_directory(directory: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(directory)
}

impl FileHandler {
    /// Create a new file handler. It stores sessions in the directory passed to `open`.
    pub fn new() -> Self {
        Default::default()
    }

    /// The path of the file storing the session `id`.
    pub fn session_path(&self, id: &SessionId) -> Result<PathBuf> {
        let config = require_configuration(&self.config)?;
        let directory = self.directory.as_ref().ok_or(Error::NotOpen)?;
        Ok(directory.join(storage_key(config, id)))
    }
}

#[async_trait]
impl StorageHandler for FileHandler {
    fn set_configuration(&mut self, config: Arc<SessionConfig>) {
        self.config = Some(config);
    }

    async fn open(&mut self, location: &Path) -> Result {
        require_configuration(&self.config)?;
        create_directory(location).map_err(|error| Error::storage(location, error))?;
        let metadata = fs::metadata(location).map_err(|error| Error::storage(location, error))?;
        if !metadata.is_dir() {
            return Err(Error::storage(
                location,
                io::Error::new(ErrorKind::Other, "the session save path is not a directory"),
            ));
        }

        log::debug!("Opened session directory {}", location.display());
        self.directory = Some(location.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> Result {
        self.directory = None;
        Ok(())
    }

    async fn read(&mut self, id: &SessionId) -> Result<Vec<u8>> {
        let path = self.session_path(id)?;
        let storage_error = |error| Error::storage(&path, error);

        // Creating the file on first read makes concurrent readers agree that the session exists.
        let file = session_file_options()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(storage_error)?;
        let _lock = FileLock::shared(&file).map_err(storage_error)?;

        let mut payload = Vec::new();
        (&file).read_to_end(&mut payload).map_err(storage_error)?;
        Ok(payload)
    }

    async fn write(&mut self, id: &SessionId, payload: &[u8]) -> Result {
        let path = self.session_path(id)?;
        let storage_error = |error| Error::storage(&path, error);

        // Truncate only after the lock is held, a concurrent reader must never see an empty file.
        let file = session_file_options()
            .write(true)
            .create(true)
            .open(&path)
            .map_err(storage_error)?;
        let _lock = FileLock::exclusive(&file).map_err(storage_error)?;

        file.set_len(0).map_err(storage_error)?;
        (&file).write_all(payload).map_err(storage_error)?;
        file.sync_data().map_err(storage_error)?;
        Ok(())
    }

    async fn destroy(&mut self, id: &SessionId) -> Result {
        let path = self.session_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(Error::storage(path, error)),
        }
    }

    async fn garbage_collect(&mut self, max_lifetime_hint: u64) -> Result<usize> {
        let config = require_configuration(&self.config)?;
        let directory = self.directory.as_ref().ok_or(Error::NotOpen)?;
        let cutoff = oldest_kept(config, max_lifetime_hint);

        let entries = fs::read_dir(directory).map_err(|error| Error::storage(directory, error))?;
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|error| Error::storage(directory, error))?;
            if !entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(config.key_prefix()))
            {
                continue;
            }

            let path = entry.path();
            match collect_if_expired(&entry, cutoff) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => {
                    log::warn!("Skipping session file {}: {error}", path.display());
                }
            }
        }

        log::debug!(
            "Deleted {removed} expired session files from {}",
            directory.display()
        );
        Ok(removed)
    }
}

fn collect_if_expired(entry: &fs::DirEntry, cutoff: DateTime<Utc>) -> io::Result<bool> {
    let metadata = entry.metadata()?;
    if !metadata.is_file() {
        return Ok(false);
    }

    let modified: DateTime<Utc> = metadata.modified()?.into();
    if modified < cutoff {
        fs::remove_file(entry.path())?;
        Ok(true)
    } else {
        Ok(false)
    }
}
