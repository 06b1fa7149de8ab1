//! Protection proxy for paths inside the artifact sandbox.
//!
//! `PantheonPath` wraps a relative path while deliberately omitting every
//! I/O operation. Components that hold one can compute with it but cannot
//! read or write through it; only the workspace unwraps the native path.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use path_slash::PathExt as _;

use crate::error::{PantheonError, Result};

/// Relative-only path value used everywhere outside the workspace.
///
/// Behaves as an immutable value object: equality and hashing use the
/// forward-slash rendering so `a/b` means the same thing on every host.
#[derive(Debug, Clone)]
pub struct PantheonPath {
    inner: PathBuf,
}

impl PantheonPath {
    /// Creates a path from a single segment, which may contain separators.
    pub fn new(segment: impl AsRef<str>) -> Result<Self> {
        Self::from_segments([segment.as_ref()])
    }

    /// Creates a path from one or more string segments.
    ///
    /// Fails with [`PantheonError::BadPath`] when no segments are given,
    /// when any segment is literally `..`, or when the combined path is
    /// absolute on the host OS.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = PathBuf::new();
        let mut count = 0usize;

        for segment in segments {
            let segment = segment.as_ref();
            if segment == ".." {
                return Err(PantheonError::BadPath(
                    "path segments may not be '..'".into(),
                ));
            }
            inner.push(segment);
            count += 1;
        }

        if count == 0 {
            return Err(PantheonError::BadPath(
                "at least one path segment is required".into(),
            ));
        }

        if inner.is_absolute() {
            return Err(PantheonError::BadPath(format!(
                "must be a relative path, got absolute path: {}",
                inner.display()
            )));
        }

        Ok(Self { inner })
    }

    /// The final component of the path, empty for `.`.
    pub fn name(&self) -> &str {
        self.inner
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    /// The final component without its suffix.
    pub fn stem(&self) -> &str {
        self.inner
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    /// The file extension of the final component, including the dot.
    pub fn suffix(&self) -> String {
        match self.inner.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{ext}"),
            None => String::new(),
        }
    }

    /// The logical parent of this path; the parent of a bare name is `.`.
    pub fn parent(&self) -> Self {
        let parent = self.inner.parent().unwrap_or_else(|| Path::new(""));
        let inner = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        Self { inner }
    }

    /// The path's components as strings.
    pub fn parts(&self) -> Vec<&str> {
        self.inner
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect()
    }

    /// Appends a single string segment, returning a new path.
    pub fn join(&self, segment: impl AsRef<str>) -> Result<Self> {
        let segment = segment.as_ref();
        if segment == ".." {
            return Err(PantheonError::BadPath(
                "path segments may not be '..'".into(),
            ));
        }
        let joined = self.inner.join(segment);
        if joined.is_absolute() {
            return Err(PantheonError::BadPath(format!(
                "joining '{segment}' produced an absolute path"
            )));
        }
        Ok(Self { inner: joined })
    }

    /// Appends another `PantheonPath`, returning a new path.
    pub fn join_path(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.join(&other.inner),
        }
    }

    /// Returns a new path with the file suffix changed. An empty suffix
    /// removes the extension; a leading dot is optional.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self> {
        let mut inner = self.inner.clone();
        let trimmed = suffix.strip_prefix('.').unwrap_or(suffix);
        if trimmed.is_empty() {
            inner.set_extension("");
        } else {
            inner.set_extension(trimmed);
        }
        Ok(Self { inner })
    }

    /// Returns this path relative to `other`.
    pub fn relative_to(&self, other: &Self) -> Result<Self> {
        let stripped = self.inner.strip_prefix(&other.inner).map_err(|_| {
            PantheonError::BadPath(format!("{self} is not relative to {other}"))
        })?;
        Ok(Self {
            inner: stripped.to_path_buf(),
        })
    }

    /// Always false: absolute paths are rejected at construction.
    pub fn is_absolute(&self) -> bool {
        false
    }

    /// Forward-slash rendering used for display, equality, and hashing.
    pub fn to_slash(&self) -> Cow<'_, str> {
        self.inner.to_slash_lossy()
    }

    /// Unwraps the underlying native path.
    ///
    /// Crate-private on purpose: the workspace is the only component that
    /// may turn a `PantheonPath` into real I/O.
    pub(crate) fn as_native(&self) -> &Path {
        &self.inner
    }
}

impl fmt::Display for PantheonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_slash())
    }
}

impl PartialEq for PantheonPath {
    fn eq(&self, other: &Self) -> bool {
        self.to_slash() == other.to_slash()
    }
}

impl Eq for PantheonPath {}

impl Hash for PantheonPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_slash().hash(state);
    }
}
