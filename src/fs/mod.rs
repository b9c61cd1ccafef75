// src/fs/mod.rs

//! Path resolution seam.
//!
//! Watches only need one thing from the filesystem: turning a requested
//! path into its canonical root. Putting that behind [`FileSystem`] lets
//! tests describe symlinks and missing paths in memory ([`mock`]).

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

pub trait FileSystem: Send + Sync + Debug {
    /// Absolute, symlink-free form of `path`. Fails if the path does not
    /// exist or cannot be accessed. May block.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;
}

/// `std::fs` backed resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        std::fs::canonicalize(path).with_context(|| format!("canonicalizing {}", path.display()))
    }
}
