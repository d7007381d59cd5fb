use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use getset::Getters;

use crate::{normalize_path, DirEntry, Metadata, VfsError, VfsResult, VirtualFileSystem};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A filesystem exposing a directory of another filesystem as its root.
///
/// Errors carry paths of the projected filesystem, not of the base.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ProjectionFileSystem {
    /// The filesystem the projection is taken from
    base: Arc<dyn VirtualFileSystem>,

    /// The directory of the base filesystem acting as root
    root: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProjectionFileSystem {
    /// Creates a projection of `root` in `base`.
    ///
    /// ## Errors
    ///
    /// Returns an error if `root` is not a directory of `base`.
    pub fn new(base: Arc<dyn VirtualFileSystem>, root: impl AsRef<Path>) -> VfsResult<Self> {
        let root = normalize_path(root.as_ref())?;
        match base.get_metadata(&root) {
            Ok(m) if m.is_dir() => Ok(Self { base, root }),
            Ok(_) => Err(VfsError::NotADirectory(root)),
            Err(e) => Err(e),
        }
    }

    fn to_base_path(&self, path: &Path) -> VfsResult<PathBuf> {
        Ok(self.root.join(normalize_path(path)?))
    }

    fn rebase_error(&self, error: VfsError, path: &Path) -> VfsError {
        match error {
            VfsError::NotFound(_) => VfsError::NotFound(path.to_path_buf()),
            VfsError::AlreadyExists(_) => VfsError::AlreadyExists(path.to_path_buf()),
            VfsError::NotADirectory(_) => VfsError::NotADirectory(path.to_path_buf()),
            VfsError::NotAFile(_) => VfsError::NotAFile(path.to_path_buf()),
            VfsError::NotEmpty(_) => VfsError::NotEmpty(path.to_path_buf()),
            e => e,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl VirtualFileSystem for ProjectionFileSystem {
    fn exists(&self, path: &Path) -> VfsResult<bool> {
        self.base.exists(&self.to_base_path(path)?)
    }

    fn get_metadata(&self, path: &Path) -> VfsResult<Metadata> {
        self.base
            .get_metadata(&self.to_base_path(path)?)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn create_directory(&self, path: &Path) -> VfsResult<()> {
        self.base
            .create_directory(&self.to_base_path(path)?)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn create_directory_all(&self, path: &Path) -> VfsResult<()> {
        self.base
            .create_directory_all(&self.to_base_path(path)?)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn read_directory(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        self.base
            .read_directory(&self.to_base_path(path)?)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn open_file(&self, path: &Path) -> VfsResult<Box<dyn Read + Send>> {
        self.base
            .open_file(&self.to_base_path(path)?)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn Write + Send>> {
        self.base
            .create_file(&self.to_base_path(path)?)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn remove(&self, path: &Path) -> VfsResult<()> {
        let base_path = self.to_base_path(path)?;
        if base_path == self.root {
            return Err(VfsError::InvalidPathComponent("cannot remove root".into()));
        }
        self.base
            .remove(&base_path)
            .map_err(|e| self.rebase_error(e, path))
    }

    fn remove_all(&self, path: &Path) -> VfsResult<()> {
        self.base.remove_all(&self.to_base_path(path)?)
    }

    fn cleanup(&self) -> VfsResult<()> {
        // The projected tree belongs to the base filesystem.
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryFileSystem;

    #[test]
    fn test_projectionfs_maps_paths() -> anyhow::Result<()> {
        let base = Arc::new(MemoryFileSystem::new());
        base.create_directory_all(Path::new("test/blobs"))?;

        let fs = ProjectionFileSystem::new(base.clone(), "test")?;
        fs.write_file(Path::new("/index.json"), b"{}")?;

        assert_eq!(base.read_file(Path::new("test/index.json"))?, b"{}");
        assert!(fs.is_dir(Path::new("blobs"))?);
        assert!(matches!(
            fs.open_file(Path::new("missing")),
            Err(VfsError::NotFound(p)) if p == Path::new("missing")
        ));
        assert!(fs.remove(Path::new("")).is_err());
        Ok(())
    }

    #[test]
    fn test_projectionfs_requires_directory() {
        let base = Arc::new(MemoryFileSystem::new());
        base.write_file(Path::new("file"), b"x").unwrap();
        assert!(matches!(
            ProjectionFileSystem::new(base.clone(), "file"),
            Err(VfsError::NotADirectory(_))
        ));
        assert!(matches!(
            ProjectionFileSystem::new(base, "missing"),
            Err(VfsError::NotFound(_))
        ));
    }
}
