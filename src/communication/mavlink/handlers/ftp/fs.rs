//! Storage behind the FTP engine
//!
//! `FileSystem` is the seam between the FTP worker and whatever storage the
//! autopilot has. `StdFileSystem` serves a directory tree on the host and
//! refuses any path that would leave its root.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use super::protocol::FtpError;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existing file, read only
    Read,
    /// Create or truncate, write only
    Create,
    /// Create if missing, keep contents, write only
    Write,
}

/// Directory entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// Storage operations used by the FTP worker.
///
/// Paths are FTP paths: `/`-separated, relative to the served root, with
/// or without a leading `/`.
pub trait FileSystem: Send {
    type File: Read + Write + Seek + Send;

    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<Self::File>;

    /// Entries of a directory, in any order
    fn read_dir(&mut self, path: &str) -> io::Result<Vec<DirEntry>>;

    fn create_dir(&mut self, path: &str) -> io::Result<()>;

    fn remove_file(&mut self, path: &str) -> io::Result<()>;

    fn remove_dir(&mut self, path: &str) -> io::Result<()>;

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()>;

    fn truncate(&mut self, path: &str, len: u64) -> io::Result<()>;
}

/// Map a storage error to its FTP NAK code and errno byte
pub fn map_io_error(err: &io::Error) -> (FtpError, u8) {
    match err.kind() {
        io::ErrorKind::NotFound => (FtpError::FileNotFound, 0),
        io::ErrorKind::AlreadyExists => (FtpError::FileExists, 0),
        io::ErrorKind::PermissionDenied => (FtpError::FileProtected, 0),
        _ => {
            // EIO when the platform gives no errno
            let errno = err.raw_os_error().unwrap_or(5);
            (FtpError::FailErrno, errno.clamp(0, 255) as u8)
        }
    }
}

/// Host directory served over FTP
#[derive(Debug, Clone)]
pub struct StdFileSystem {
    root: PathBuf,
}

impl StdFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an FTP path under the root.
    ///
    /// `..`, drive prefixes and anything else that could escape the root
    /// fail with `PermissionDenied`.
    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        "path escapes FTP root",
                    ));
                }
            }
        }
        Ok(resolved)
    }
}

impl FileSystem for StdFileSystem {
    type File = File;

    fn open(&mut self, path: &str, mode: OpenMode) -> io::Result<File> {
        let path = self.resolve(path)?;
        match mode {
            OpenMode::Read => File::open(path),
            OpenMode::Create => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path),
            OpenMode::Write => OpenOptions::new().write(true).create(true).open(path),
        }
    }

    fn read_dir(&mut self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let kind = if meta.is_file() {
                EntryKind::File
            } else if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::Other
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size: meta.len(),
            });
        }
        Ok(entries)
    }

    fn create_dir(&mut self, path: &str) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?)
    }

    fn remove_file(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }

    fn remove_dir(&mut self, path: &str) -> io::Result<()> {
        fs::remove_dir(self.resolve(path)?)
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn truncate(&mut self, path: &str, len: u64) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(self.resolve(path)?)?
            .set_len(len)
    }
}
