// src/fs/mock.rs

use super::FileSystem;
use crate::handle::emitter::lock;
use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const MAX_LINK_HOPS: usize = 40;

#[derive(Debug, Default)]
struct MockTree {
    dirs: HashSet<PathBuf>,
    links: HashMap<PathBuf, PathBuf>,
}

/// In-memory directory tree with symlinks, for canonicalization tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    tree: Arc<Mutex<MockTree>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory and all of its ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut tree = lock(&self.tree);
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            tree.dirs.insert(ancestor.to_path_buf());
        }
    }

    /// Make `link` resolve to `target`.
    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let mut tree = lock(&self.tree);
        tree.links
            .insert(link.as_ref().to_path_buf(), target.as_ref().to_path_buf());
    }

    pub fn remove_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut tree = lock(&self.tree);
        tree.dirs.retain(|d| !d.starts_with(path));
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let tree = lock(&self.tree);
        let mut resolved = PathBuf::new();
        let mut hops = 0;

        for component in path.components() {
            resolved.push(component);
            while let Some(target) = tree.links.get(&resolved) {
                hops += 1;
                if hops > MAX_LINK_HOPS {
                    return Err(anyhow!("Too many levels of symbolic links: {:?}", path));
                }
                resolved = target.clone();
            }
        }

        if tree.dirs.contains(&resolved) {
            Ok(resolved)
        } else {
            Err(anyhow!("Not found: {:?}", path))
        }
    }
}

impl FileSystem for MockFileSystem {
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.resolve(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_resolve_through_intermediate_components() {
        let fs = MockFileSystem::new();
        fs.add_dir("/data/projects/app/src");
        fs.add_symlink("/home/me/work", "/data/projects");

        assert_eq!(
            fs.canonicalize(Path::new("/home/me/work/app/src")).unwrap(),
            PathBuf::from("/data/projects/app/src")
        );
    }

    #[test]
    fn missing_and_looping_paths_fail() {
        let fs = MockFileSystem::new();
        fs.add_dir("/a");
        fs.add_symlink("/loop", "/loop");

        assert!(fs.canonicalize(Path::new("/a/missing")).is_err());
        assert!(fs.canonicalize(Path::new("/loop")).is_err());

        fs.remove_dir("/a");
        assert!(fs.canonicalize(Path::new("/a")).is_err());
    }
}
