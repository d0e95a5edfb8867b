//! Where tree files come from.
//!
//! Paths are relative to the tree directory and always use `/`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Read access to a tree's files. Called from worker threads.
pub trait DataSource: Send + Sync {
  fn read(&self, path: &str) -> io::Result<Vec<u8>>;

  /// Size in bytes of the file at `path`.
  fn file_len(&self, path: &str) -> io::Result<u64>;

  /// Human-readable location for log messages.
  fn describe(&self) -> String;
}

/// Tree stored in a local directory.
#[derive(Clone, Debug)]
pub struct DirectorySource {
  root: PathBuf,
}

impl DirectorySource {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn resolve(&self, path: &str) -> PathBuf {
    path
      .split('/')
      .filter(|part| !part.is_empty())
      .fold(self.root.clone(), |acc, part| acc.join(part))
  }
}

impl DataSource for DirectorySource {
  fn read(&self, path: &str) -> io::Result<Vec<u8>> {
    std::fs::read(self.resolve(path))
  }

  fn file_len(&self, path: &str) -> io::Result<u64> {
    std::fs::metadata(self.resolve(path)).map(|m| m.len())
  }

  fn describe(&self) -> String {
    self.root.display().to_string()
  }
}

/// Tree held in memory, keyed by relative path.
#[derive(Debug, Default)]
pub struct MemorySource {
  files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
    if let Ok(mut files) = self.files.write() {
      files.insert(path.into(), bytes);
    }
  }

  pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
    self.files.write().ok()?.remove(path)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.files.read().is_ok_and(|files| files.contains_key(path))
  }

  fn lookup<R>(&self, path: &str, f: impl FnOnce(&Vec<u8>) -> R) -> io::Result<R> {
    let files = self
      .files
      .read()
      .map_err(|_| io::Error::other("memory source lock poisoned"))?;
    files
      .get(path)
      .map(f)
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} not found")))
  }
}

impl DataSource for MemorySource {
  fn read(&self, path: &str) -> io::Result<Vec<u8>> {
    self.lookup(path, Clone::clone)
  }

  fn file_len(&self, path: &str) -> io::Result<u64> {
    self.lookup(path, |bytes| bytes.len() as u64)
  }

  fn describe(&self) -> String {
    "<memory>".to_string()
  }
}
