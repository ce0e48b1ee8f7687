//! In-memory project files shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use resurrect_core::ManifestAccessor;

/// [`ManifestAccessor`] over a map of paths, recording every write.
#[derive(Default)]
pub struct MemoryFiles {
    files: Mutex<HashMap<PathBuf, String>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryFiles {
    pub fn with_file(path: impl Into<PathBuf>, contents: &str) -> Self {
        let files = Self::default();
        files
            .files
            .lock()
            .unwrap()
            .insert(path.into(), contents.to_string());
        files
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl ManifestAccessor for MemoryFiles {
    async fn read_text(&self, path: &Path) -> std::io::Result<String> {
        self.contents(path)
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }

    async fn write_text(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        match self.files.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
        }
    }

    async fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }
}
