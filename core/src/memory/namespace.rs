use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use super::MemoryError;

/// A directory that capabilities may read and write beneath, and nowhere else.
#[derive(Debug, Clone)]
pub struct Namespace {
    root: PathBuf,
}

impl Namespace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative file name onto a path under the root.
    ///
    /// Absolute paths, drive prefixes and `..` components are rejected, so
    /// the result can never leave the root lexically.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, MemoryError> {
        if name.trim().is_empty() {
            return Err(MemoryError::InvalidName(name.to_string()));
        }

        let mut path = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MemoryError::OutsideNamespace(name.to_string()));
                }
            }
        }

        if depth == 0 {
            return Err(MemoryError::InvalidName(name.to_string()));
        }
        Ok(path)
    }

    /// Full content of `name`, or `None` when it does not exist.
    pub fn read(&self, name: &str) -> Result<Option<String>, MemoryError> {
        let path = self.resolve(name)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `content` plus a trailing newline, replacing or appending.
    pub fn write(&self, name: &str, content: &str, append: bool) -> Result<PathBuf, MemoryError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)?;
        writeln!(file, "{}", content)?;
        Ok(path)
    }

    /// Names of the regular files directly under the root, sorted.
    pub fn list(&self) -> Result<Vec<String>, MemoryError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
