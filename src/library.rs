//! Library store: the category-partitioned destination tree.
//!
//! Files are copied, never moved, to `<root>/<category>/<normalized name>`,
//! replacing any previous copy. Writes go through a temp file in the
//! category directory and a rename, so a reader never sees a partial file.

use anyhow::{Context, Result};
use std::fs::Permissions;
use std::path::{Path, PathBuf};

use crate::fsutil;

#[derive(Debug, Clone)]
pub struct LibraryStore {
    root: PathBuf,
}

impl LibraryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and one directory per category.
    pub fn ensure_layout<'a, I>(&self, categories: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        for category in categories {
            let dir = self.root.join(category);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn destination(&self, category: &str, normalized_name: &str) -> PathBuf {
        self.root.join(category).join(normalized_name)
    }

    /// Write a document's bytes to `<root>/<category>/<name>` and return
    /// the destination.
    ///
    /// The pipeline passes the bytes it already read, so the library copy
    /// is exactly the content that was indexed even if the source changes
    /// mid-run. `permissions` are those of the source file; the copy keeps
    /// them the way a plain file copy would.
    pub fn place(
        &self,
        bytes: &[u8],
        permissions: Option<&Permissions>,
        category: &str,
        normalized_name: &str,
    ) -> Result<PathBuf> {
        let dest = self.destination(category, normalized_name);
        fsutil::atomic_write(&dest, bytes, permissions)
            .with_context(|| format!("failed to store {}", dest.display()))?;
        Ok(dest)
    }
}
