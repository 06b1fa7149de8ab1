//! Narrow I/O port separating computation from the real filesystem.
//!
//! Every filesystem touch in the framework goes through the [`FileSystem`]
//! trait so higher layers can be exercised against [`MemoryFileSystem`]
//! without a disk.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{PantheonError, Result};

const BUNDLED_RESOURCES: &[(&str, &str)] = &[
    (
        "routines/create-process-routine.md",
        include_str!("../resources/routines/create-process-routine.md"),
    ),
    (
        "routines/get-process-routine.md",
        include_str!("../resources/routines/get-process-routine.md"),
    ),
    (
        "routines/update-process-routine.md",
        include_str!("../resources/routines/update-process-routine.md"),
    ),
];

/// Stateless I/O boundary. All implementations must be thread-safe.
pub trait FileSystem: Send + Sync {
    fn read_text(&self, path: &Path) -> Result<String>;
    fn write_text(&self, path: &Path, content: &str) -> Result<()>;
    fn append_text(&self, path: &Path, content: &str) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<()>;
    fn rmdir(&self, path: &Path) -> Result<()>;
    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<()>;
    /// Non-recursive listing of one directory.
    fn iterdir(&self, path: &Path) -> Result<Vec<PathBuf>>;
    /// POSIX-style glob relative to `directory`.
    fn glob(&self, directory: &Path, pattern: &str) -> Result<Vec<PathBuf>>;
    /// Reads a resource bundled with the crate (default routine templates).
    fn read_bundled_resource(&self, resource_path: &str) -> Result<String> {
        BUNDLED_RESOURCES
            .iter()
            .find(|(name, _)| *name == resource_path)
            .map(|(_, content)| (*content).to_owned())
            .ok_or_else(|| {
                PantheonError::NotFound(format!("bundled resource '{resource_path}'"))
            })
    }
}

impl<F> FileSystem for Arc<F>
where
    F: FileSystem + ?Sized,
{
    fn read_text(&self, path: &Path) -> Result<String> {
        (**self).read_text(path)
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        (**self).write_text(path, content)
    }

    fn append_text(&self, path: &Path, content: &str) -> Result<()> {
        (**self).append_text(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<()> {
        (**self).mkdir(path, parents, exist_ok)
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        (**self).rmdir(path)
    }

    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<()> {
        (**self).unlink(path, missing_ok)
    }

    fn iterdir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        (**self).iterdir(path)
    }

    fn glob(&self, directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        (**self).glob(directory, pattern)
    }

    fn read_bundled_resource(&self, resource_path: &str) -> Result<String> {
        (**self).read_bundled_resource(resource_path)
    }
}

fn map_io_error(err: std::io::Error, path: &Path) -> PantheonError {
    match err.kind() {
        ErrorKind::NotFound => PantheonError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => {
            PantheonError::PermissionDenied(path.display().to_string())
        }
        ErrorKind::InvalidData => PantheonError::Decode(format!(
            "{}: file is not valid UTF-8",
            path.display()
        )),
        _ => PantheonError::Io(err),
    }
}

/// Real filesystem backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFileSystem {
    fn read_text(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|err| map_io_error(err, path))
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        fs::write(path, content).map_err(|err| map_io_error(err, path))
    }

    fn append_text(&self, path: &Path, content: &str) -> Result<()> {
        use std::io::Write as _;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| map_io_error(err, path))?;
        file.write_all(content.as_bytes())
            .map_err(|err| map_io_error(err, path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<()> {
        let result = if parents {
            if exist_ok {
                return fs::create_dir_all(path).map_err(|err| map_io_error(err, path));
            }
            fs::create_dir_all(path)
        } else {
            fs::create_dir(path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists && exist_ok && path.is_dir() => {
                Ok(())
            }
            Err(err) => Err(map_io_error(err, path)),
        }
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|err| map_io_error(err, path))
    }

    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound && missing_ok => Ok(()),
            Err(err) => Err(map_io_error(err, path)),
        }
    }

    fn iterdir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(path).map_err(|err| map_io_error(err, path))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| map_io_error(err, path))?;
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }

    fn glob(&self, directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        if !directory.exists() {
            return Err(PantheonError::NotFound(format!(
                "directory not found: {}",
                directory.display()
            )));
        }
        if !directory.is_dir() {
            return Err(PantheonError::InvalidConfig(format!(
                "not a directory: {}",
                directory.display()
            )));
        }

        let full_pattern = directory.join(pattern);
        let full_pattern = full_pattern.to_string_lossy();
        let paths = glob::glob(&full_pattern)
            .map_err(|err| PantheonError::InvalidConfig(format!("invalid glob pattern: {err}")))?;

        let mut matches: Vec<PathBuf> = paths.filter_map(|entry| entry.ok()).collect();
        matches.sort();
        Ok(matches)
    }
}

/// In-memory filesystem for unit tests.
///
/// Directories are tracked explicitly so `mkdir`/`iterdir` semantics match
/// the real filesystem closely enough for workspace-level tests.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file, creating every parent directory.
    pub fn seed(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        self.record_parents(&path);
        self.files.lock().insert(path, content.into());
    }

    fn record_parents(&self, path: &Path) {
        let mut dirs = self.dirs.lock();
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().contains(path)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_text(&self, path: &Path) -> Result<String> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| PantheonError::NotFound(path.display().to_string()))
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.is_dir(parent) {
                return Err(PantheonError::NotFound(parent.display().to_string()));
            }
        }
        self.files.lock().insert(path.to_path_buf(), content.to_owned());
        Ok(())
    }

    fn append_text(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.is_dir(parent) {
                return Err(PantheonError::NotFound(parent.display().to_string()));
            }
        }
        self.files
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .push_str(content);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path) || self.is_dir(path)
    }

    fn mkdir(&self, path: &Path, parents: bool, exist_ok: bool) -> Result<()> {
        if self.is_dir(path) {
            if exist_ok {
                return Ok(());
            }
            return Err(PantheonError::Io(std::io::Error::new(
                ErrorKind::AlreadyExists,
                path.display().to_string(),
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.is_dir(parent) {
                if !parents {
                    return Err(PantheonError::NotFound(parent.display().to_string()));
                }
                self.record_parents(path);
            }
        }

        self.dirs.lock().insert(path.to_path_buf());
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        if !self.is_dir(path) {
            return Err(PantheonError::NotFound(path.display().to_string()));
        }
        if !self.iterdir(path)?.is_empty() {
            return Err(PantheonError::Io(std::io::Error::new(
                ErrorKind::Other,
                format!("directory not empty: {}", path.display()),
            )));
        }
        self.dirs.lock().remove(path);
        Ok(())
    }

    fn unlink(&self, path: &Path, missing_ok: bool) -> Result<()> {
        if self.files.lock().remove(path).is_none() && !missing_ok {
            return Err(PantheonError::NotFound(path.display().to_string()));
        }
        Ok(())
    }

    fn iterdir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if !self.is_dir(path) {
            return Err(PantheonError::NotFound(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let mut entries = BTreeSet::new();
        for file in self.files.lock().keys() {
            if file.parent() == Some(path) {
                entries.insert(file.clone());
            }
        }
        for dir in self.dirs.lock().iter() {
            if dir.parent() == Some(path) {
                entries.insert(dir.clone());
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn glob(&self, directory: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
        if !self.is_dir(directory) {
            return Err(PantheonError::NotFound(format!(
                "directory not found: {}",
                directory.display()
            )));
        }

        let matcher = glob::Pattern::new(pattern)
            .map_err(|err| PantheonError::InvalidConfig(format!("invalid glob pattern: {err}")))?;

        let mut matches = BTreeSet::new();
        let candidates: Vec<PathBuf> = {
            let files = self.files.lock();
            let dirs = self.dirs.lock();
            files.keys().cloned().chain(dirs.iter().cloned()).collect()
        };
        for candidate in candidates {
            if let Ok(relative) = candidate.strip_prefix(directory) {
                if !relative.as_os_str().is_empty() && matcher.matches_path(relative) {
                    matches.insert(candidate);
                }
            }
        }
        Ok(matches.into_iter().collect())
    }
}
