//! File-backed storage
//!
//! Positional reads and writes on a single file, plus the durability
//! primitives used when the file is first created.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::btree::node::PAGE_SIZE;
use crate::error::{KvError, Result};

use super::{bootstrap_pages, StorageBackend};

/// Store file backend
///
/// Uses positional I/O, so concurrent readers need no shared cursor.
pub struct FileBackend {
    /// Open handle (read + write)
    file: File,

    /// Path for diagnostics
    path: PathBuf,
}

impl FileBackend {
    /// Open a store file, creating it if missing and `create` is set
    ///
    /// A new file is written atomically with the bootstrap pages, so a crash
    /// during creation leaves either no file or a complete empty store.
    pub fn open(path: &Path, create: bool) -> Result<Self> {
        if !path.exists() {
            if !create {
                return Err(KvError::Config(format!(
                    "store file {} does not exist",
                    path.display()
                )));
            }
            let image: Vec<u8> = bootstrap_pages().concat();
            write_file_atomic(path, &image)?;
            tracing::info!("Created store file {}", path.display());
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_page(&self, ptr: u64) -> Result<Vec<u8>> {
        let mut page = vec![0u8; PAGE_SIZE];
        let offset = self.page_offset(ptr);
        let len = self.file.metadata()?.len();
        if offset >= len {
            return Ok(page);
        }
        read_exact_at(&self.file, &mut page, offset)?;
        Ok(page)
    }

    fn write_page(&self, ptr: u64, data: &[u8]) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(KvError::Corruption(format!(
                "page image of {} bytes (expected {})",
                data.len(),
                PAGE_SIZE
            )));
        }
        write_all_at(&self.file, data, self.page_offset(ptr))
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn page_count(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len() / PAGE_SIZE as u64)
    }
}

// =============================================================================
// Durability Primitives
// =============================================================================

/// Replace the contents of `path` atomically
///
/// Writes a temp file next to `path`, fsyncs it, renames it over `path`,
/// then fsyncs the directory. Concurrent openers see either the old or the
/// new file, and a crash before the rename leaves the old content intact.
pub fn write_file_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = temp_path(path);

    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }
    Ok(())
}

/// Make directory entries (creates, renames) durable
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Make directory entries (creates, renames) durable
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    // directories cannot be opened for sync here; rename is already durable
    Ok(())
}

/// "store.db" → "store.db.tmp.<pid>"
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{}", std::process::id()));
    path.with_file_name(name)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)?;
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        buf = &mut buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)?;
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        let n = file.seek_write(data, offset)?;
        data = &data[n..];
        offset += n as u64;
    }
    Ok(())
}
