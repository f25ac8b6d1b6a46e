//! File backend: open/append/rotate/retain, coordinating with other
//! processes via an advisory lock on a sidecar `.lock` file.
//!
//! A buffered-writer-plus-mutex destination, the same shape used elsewhere
//! in this crate for a single-writer sink, generalized from date-stamped
//! rotation to the numeric-index rotation this backend's contract requires.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::compression::CompressionHandle;
use crate::config::RotationPolicy;
use crate::error::{Error, ErrorKind, Severity};

use super::Backend;

pub struct FileDestination {
    path: PathBuf,
    lock_path: PathBuf,
    writer: BufWriter<File>,
    lock_file: File,
    size: u64,
    rotation: RotationPolicy,
    compression: CompressionHandle,
    compression_min_age: u32,
    rotation_count: u64,
}

impl FileDestination {
    pub fn open(
        path: impl Into<PathBuf>,
        rotation: RotationPolicy,
        compression: CompressionHandle,
    ) -> Result<Self, Error> {
        Self::open_with_compression_min_age(path, rotation, compression, 1)
    }

    /// Full constructor, used by callers that also carry a
    /// [`crate::config::CompressionPolicy`] with a non-default `min_age`.
    pub fn open_with_compression_min_age(
        path: impl Into<PathBuf>,
        rotation: RotationPolicy,
        compression: CompressionHandle,
        compression_min_age: u32,
    ) -> Result<Self, Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::new(ErrorKind::FileOpen, "create_dir_all", Severity::Critical)
                        .with_path(path.display().to_string())
                        .with_cause(e)
                })?;
            }
        }
        let lock_path = lock_sidecar(&path);
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                Error::new(ErrorKind::FileOpen, "open_lock", Severity::Critical)
                    .with_path(lock_path.display().to_string())
                    .with_cause(e)
            })?;
        let file = open_append(&path)?;
        let size = file
            .metadata()
            .map_err(|e| Error::new(ErrorKind::FileStat, "stat", Severity::High).with_cause(e))?
            .len();
        Ok(FileDestination {
            path,
            lock_path,
            writer: BufWriter::new(file),
            lock_file,
            size,
            rotation,
            compression,
            compression_min_age: compression_min_age.max(1),
            rotation_count: 0,
        })
    }

    fn acquire_lock(&self) -> Result<(), Error> {
        self.lock_file.lock_exclusive().map_err(|e| {
            Error::new(ErrorKind::FileLock, "flock", Severity::Medium)
                .with_path(self.lock_path.display().to_string())
                .with_cause(e)
        })
    }

    fn release_lock(&self) {
        let _ = fs2::FileExt::unlock(&self.lock_file);
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(format!(".{index}"));
        PathBuf::from(p)
    }

    fn rotated_gz_path(&self, index: u32) -> PathBuf {
        let mut p = self.rotated_path(index).into_os_string();
        p.push(".gz");
        PathBuf::from(p)
    }

    /// Implements the shift-then-swap rotation algorithm
    fn do_rotate(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(flush_err)?;

        let max_files = self.rotation.max_files;
        for i in (1..max_files).rev() {
            let target = self.rotated_path(i + 1);
            let target_gz = self.rotated_gz_path(i + 1);
            if target.exists() {
                let _ = fs::remove_file(&target);
            }
            if target_gz.exists() {
                let _ = fs::remove_file(&target_gz);
            }
            let src_gz = self.rotated_gz_path(i);
            let src_plain = self.rotated_path(i);
            if src_gz.exists() {
                fs::rename(&src_gz, &target_gz).map_err(|e| rotate_err(&self.path, e))?;
            } else if src_plain.exists() {
                fs::rename(&src_plain, &target).map_err(|e| rotate_err(&self.path, e))?;
                if i + 1 >= self.compression_min_age_threshold() {
                    let _ = self.compression.enqueue(target.clone());
                }
            }
        }

        let first_rotated = self.rotated_path(1);
        fs::rename(&self.path, &first_rotated).map_err(|e| rotate_err(&self.path, e))?;
        if self.compression_min_age_threshold() <= 1 {
            let _ = self.compression.enqueue(first_rotated);
        }

        let fresh = open_append(&self.path)?;
        self.writer = BufWriter::new(fresh);
        self.size = 0;
        self.rotation_count += 1;
        Ok(())
    }

    fn compression_min_age_threshold(&self) -> u32 {
        self.compression_min_age
    }
}

impl Backend for FileDestination {
    fn write_record(&mut self, _record: &crate::record::Record, bytes: &[u8]) -> Result<(), Error> {
        let path = self.path.clone();
        self.acquire_lock()?;

        let result = (|| {
            if self.size + bytes.len() as u64 > self.rotation.max_size {
                self.do_rotate()?;
            }
            self.writer.write_all(bytes).map_err(|e| {
                Error::new(ErrorKind::FileWrite, "write", Severity::Medium)
                    .with_path(path.display().to_string())
                    .with_cause(e)
            })?;
            self.writer.flush().map_err(flush_err)?;
            self.size += bytes.len() as u64;
            Ok(())
        })();

        self.release_lock();
        result
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(flush_err)
    }

    fn rotate(&mut self) -> Result<(), Error> {
        self.acquire_lock()?;
        let result = self.do_rotate();
        self.release_lock();
        result
    }

    fn close(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(flush_err)?;
        let _ = fs::remove_file(&self.lock_path);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn set_rotation_policy(&mut self, mut policy: RotationPolicy) {
        policy.normalize();
        self.rotation = policy;
    }

    fn set_compression(&mut self, handle: CompressionHandle) {
        self.compression = handle;
    }

    fn set_compression_min_age(&mut self, min_age: u32) {
        self.compression_min_age = min_age.max(1);
    }

    fn take_rotation_count(&mut self) -> u64 {
        std::mem::take(&mut self.rotation_count)
    }

    /// Retention sweep: lists `^<base>(\.<n>)?(\.gz)?$` siblings of
    /// the live log, skips the live log itself, and deletes anything whose
    /// modification time is older than `max_age`.
    fn retain(&mut self) -> Result<u64, Error> {
        let Some(max_age) = self.rotation.max_age else {
            return Ok(0);
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let base = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let pattern = regex::Regex::new(&format!(r"^{}(\.\d+)?(\.gz)?$", regex::escape(base)))
            .map_err(|e| {
                Error::new(ErrorKind::InvalidConfig, "retain", Severity::Low).with_cause(e)
            })?;

        let entries = fs::read_dir(dir).map_err(|e| {
            Error::new(ErrorKind::FileStat, "retain", Severity::Medium)
                .with_path(dir.display().to_string())
                .with_cause(e)
        })?;

        let now = std::time::SystemTime::now();
        let mut deleted = 0u64;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };
            if name_str == base || !pattern.is_match(name_str) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let is_stale = now
                .duration_since(modified)
                .map(|age| age > max_age)
                .unwrap_or(false);
            if is_stale && fs::remove_file(entry.path()).is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn lock_sidecar(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_os_string();
    p.push(".lock");
    PathBuf::from(p)
}

fn open_append(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
        .map_err(|e| {
            Error::new(ErrorKind::FileOpen, "open", Severity::Critical)
                .with_path(path.display().to_string())
                .with_cause(e)
        })
}

fn flush_err(e: io::Error) -> Error {
    Error::new(ErrorKind::FileFlush, "flush", Severity::Medium).with_cause(e)
}

fn rotate_err(path: &Path, e: io::Error) -> Error {
    Error::new(ErrorKind::FileRotate, "rotate", Severity::Medium)
        .with_path(path.display().to_string())
        .with_cause(e)
}
