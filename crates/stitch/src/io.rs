//! Filesystem collaborator
//!
//! The pipeline only touches storage through [`Io`]. Existence probes never
//! fail on "not found"; only real I/O errors propagate.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;

use crate::error::BundleError;

#[allow(async_fn_in_trait)]
pub trait Io {
    async fn file_exists(&self, path: &Path) -> Result<bool>;
    async fn directory_exists(&self, path: &Path) -> Result<bool>;
    async fn read_file(&self, path: &Path) -> Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;
}

/// The real filesystem through `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskIo;

impl DiskIo {
    async fn probe(path: &Path) -> Result<Option<std::fs::Metadata>> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(err) => Err(BundleError::io(path, err).into()),
        }
    }
}

impl Io for DiskIo {
    async fn file_exists(&self, path: &Path) -> Result<bool> {
        Ok(Self::probe(path).await?.is_some_and(|m| m.is_file()))
    }

    async fn directory_exists(&self, path: &Path) -> Result<bool> {
        Ok(Self::probe(path).await?.is_some_and(|m| m.is_dir()))
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| BundleError::io(path, err).into())
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| BundleError::io(parent, err))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|err| BundleError::io(path, err).into())
    }
}

/// An in-memory project. Directories exist implicitly above every file.
#[derive(Debug, Default)]
pub struct MemoryIo {
    files: RefCell<BTreeMap<PathBuf, String>>,
}

impl MemoryIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        let io = Self::new();
        for (path, content) in files {
            io.insert(path, content);
        }
        io
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }
}

impl Io for MemoryIo {
    async fn file_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files.borrow().contains_key(path))
    }

    async fn directory_exists(&self, path: &Path) -> Result<bool> {
        Ok(self
            .files
            .borrow()
            .keys()
            .any(|file| file != path && file.starts_with(path)))
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        self.get(path).ok_or_else(|| {
            BundleError::io(path, std::io::Error::from(ErrorKind::NotFound)).into()
        })
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.insert(path, content);
        Ok(())
    }
}
