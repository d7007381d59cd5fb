use std::{
    fs::{self, File},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use getset::Getters;
use tempfile::TempDir;

use crate::{
    normalize_path, DirEntry, EntityType, Metadata, VfsError, VfsResult, VirtualFileSystem,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The prefix used for temporary directories allocated by [`NativeFileSystem::temporary`].
pub const TEMP_DIR_PREFIX: &str = "ocm-";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A filesystem implementation that uses the native filesystem.
///
/// This implementation provides direct access to the underlying filesystem, rooted at a specific
/// directory. All operations are performed relative to this root directory.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct NativeFileSystem {
    /// The root directory for this filesystem instance
    root_path: PathBuf,

    /// The owned temporary directory, if this filesystem was allocated as one
    #[getset(skip)]
    temp_dir: Option<Arc<TempDir>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NativeFileSystem {
    /// Creates a new native filesystem with the given root path.
    ///
    /// ## Arguments
    ///
    /// * `root_path` - The root path for this filesystem instance
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            temp_dir: None,
        }
    }

    /// Creates a native filesystem rooted at a freshly allocated temporary directory.
    ///
    /// The directory is removed by [`VirtualFileSystem::cleanup`], or at the latest when the last
    /// clone of this filesystem is dropped.
    pub fn temporary() -> VfsResult<Self> {
        let temp_dir = tempfile::Builder::new().prefix(TEMP_DIR_PREFIX).tempdir()?;
        tracing::debug!("allocated temporary filesystem at {}", temp_dir.path().display());
        Ok(Self {
            root_path: temp_dir.path().to_path_buf(),
            temp_dir: Some(Arc::new(temp_dir)),
        })
    }

    /// Returns `true` if this filesystem owns a temporary directory.
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }

    /// Converts a virtual path to a native filesystem path.
    ///
    /// ## Errors
    ///
    /// Returns an error if the path would escape the root directory.
    fn to_native_path(&self, path: &Path) -> VfsResult<PathBuf> {
        let relative = normalize_path(path)?;
        if relative.as_os_str().is_empty() {
            Ok(self.root_path.clone())
        } else {
            Ok(self.root_path.join(relative))
        }
    }

    /// Gets metadata for a path, returning None if the path doesn't exist.
    fn metadata_option(native_path: &Path) -> VfsResult<Option<fs::Metadata>> {
        match fs::metadata(native_path) {
            Ok(m) => Ok(Some(m)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VfsError::Io(e)),
        }
    }

    fn to_metadata(metadata: &fs::Metadata) -> Metadata {
        if metadata.is_dir() {
            Metadata::new(EntityType::Directory, 0)
        } else {
            Metadata::new(EntityType::File, metadata.len())
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl VirtualFileSystem for NativeFileSystem {
    fn exists(&self, path: &Path) -> VfsResult<bool> {
        let native_path = self.to_native_path(path)?;
        Ok(Self::metadata_option(&native_path)?.is_some())
    }

    fn get_metadata(&self, path: &Path) -> VfsResult<Metadata> {
        let native_path = self.to_native_path(path)?;
        Self::metadata_option(&native_path)?
            .map(|m| Self::to_metadata(&m))
            .ok_or_else(|| VfsError::NotFound(path.to_path_buf()))
    }

    fn create_directory(&self, path: &Path) -> VfsResult<()> {
        let native_path = self.to_native_path(path)?;
        if Self::metadata_option(&native_path)?.is_some() {
            return Err(VfsError::AlreadyExists(path.to_path_buf()));
        }

        if let Some(parent) = native_path.parent() {
            if Self::metadata_option(parent)?.is_none() {
                return Err(VfsError::ParentDirectoryNotFound(parent.to_path_buf()));
            }
        }

        fs::create_dir(&native_path).map_err(|e| VfsError::from_io(e, path))
    }

    fn create_directory_all(&self, path: &Path) -> VfsResult<()> {
        let native_path = self.to_native_path(path)?;
        match Self::metadata_option(&native_path)? {
            Some(m) if m.is_dir() => Ok(()),
            Some(_) => Err(VfsError::NotADirectory(path.to_path_buf())),
            None => fs::create_dir_all(&native_path).map_err(|e| VfsError::from_io(e, path)),
        }
    }

    fn read_directory(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let native_path = self.to_native_path(path)?;
        match Self::metadata_option(&native_path)? {
            None => return Err(VfsError::NotFound(path.to_path_buf())),
            Some(m) if !m.is_dir() => return Err(VfsError::NotADirectory(path.to_path_buf())),
            Some(_) => {}
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&native_path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                Self::to_metadata(&metadata),
            ));
        }
        entries.sort_by(|a, b| a.get_name().cmp(b.get_name()));

        Ok(entries)
    }

    fn open_file(&self, path: &Path) -> VfsResult<Box<dyn Read + Send>> {
        let native_path = self.to_native_path(path)?;
        match Self::metadata_option(&native_path)? {
            None => Err(VfsError::NotFound(path.to_path_buf())),
            Some(m) if m.is_dir() => Err(VfsError::NotAFile(path.to_path_buf())),
            Some(_) => {
                let file = File::open(&native_path).map_err(|e| VfsError::from_io(e, path))?;
                Ok(Box::new(file))
            }
        }
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn Write + Send>> {
        let native_path = self.to_native_path(path)?;
        if let Some(parent) = native_path.parent() {
            if Self::metadata_option(parent)?.is_none() {
                return Err(VfsError::ParentDirectoryNotFound(parent.to_path_buf()));
            }
        }

        if let Some(m) = Self::metadata_option(&native_path)? {
            if m.is_dir() {
                return Err(VfsError::NotAFile(path.to_path_buf()));
            }
        }

        let file = File::create(&native_path).map_err(|e| VfsError::from_io(e, path))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn remove(&self, path: &Path) -> VfsResult<()> {
        let native_path = self.to_native_path(path)?;
        match Self::metadata_option(&native_path)? {
            None => Err(VfsError::NotFound(path.to_path_buf())),
            Some(m) if m.is_dir() => {
                if fs::read_dir(&native_path)?.next().is_some() {
                    return Err(VfsError::NotEmpty(path.to_path_buf()));
                }
                fs::remove_dir(&native_path).map_err(|e| VfsError::from_io(e, path))
            }
            Some(_) => fs::remove_file(&native_path).map_err(|e| VfsError::from_io(e, path)),
        }
    }

    fn remove_all(&self, path: &Path) -> VfsResult<()> {
        let native_path = self.to_native_path(path)?;
        let result = match Self::metadata_option(&native_path)? {
            None => return Ok(()),
            Some(m) if m.is_dir() => fs::remove_dir_all(&native_path),
            Some(_) => fs::remove_file(&native_path),
        };

        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(VfsError::Io(e)),
            _ => Ok(()),
        }
    }

    fn cleanup(&self) -> VfsResult<()> {
        if self.temp_dir.is_none() {
            return Ok(());
        }

        tracing::debug!("removing temporary filesystem at {}", self.root_path.display());
        match fs::remove_dir_all(&self.root_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(VfsError::Io(e)),
            _ => Ok(()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nativefs_write_and_list() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let fs = NativeFileSystem::new(temp_dir.path());

        fs.create_directory_all(Path::new("blobs/sha256"))?;
        fs.write_file(Path::new("blobs/sha256/abc"), b"testdata")?;
        fs.write_file(Path::new("index.json"), b"{}")?;

        assert!(temp_dir.path().join("blobs/sha256/abc").is_file());
        assert_eq!(fs.read_file(Path::new("blobs/sha256/abc"))?, b"testdata");

        let names: Vec<_> = fs
            .read_directory(Path::new(""))?
            .into_iter()
            .map(|e| e.get_name().clone())
            .collect();
        assert_eq!(names, vec!["blobs", "index.json"]);

        assert!(matches!(
            fs.remove(Path::new("blobs")),
            Err(VfsError::NotEmpty(_))
        ));
        fs.remove_all(Path::new("blobs"))?;
        assert!(!fs.exists(Path::new("blobs"))?);

        Ok(())
    }

    #[test]
    fn test_nativefs_rejects_escaping_paths() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let fs = NativeFileSystem::new(temp_dir.path());
        assert!(matches!(
            fs.exists(Path::new("../outside")),
            Err(VfsError::InvalidPathComponent(_))
        ));
        Ok(())
    }

    #[test]
    fn test_nativefs_missing_paths() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let fs = NativeFileSystem::new(temp_dir.path());
        assert!(matches!(
            fs.open_file(Path::new("missing")),
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            fs.read_directory(Path::new("missing")),
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            fs.create_file(Path::new("missing/file")),
            Err(VfsError::ParentDirectoryNotFound(_))
        ));
        Ok(())
    }

    #[test_log::test]
    fn test_nativefs_temporary_cleanup() -> anyhow::Result<()> {
        let fs = NativeFileSystem::temporary()?;
        let root = fs.get_root_path().clone();
        assert!(fs.is_temporary());
        fs.write_file(Path::new("oci-layout"), b"{}")?;
        assert!(root.join("oci-layout").exists());

        fs.cleanup()?;
        assert!(!root.exists());
        fs.cleanup()?;

        // Cleanup of a non temporary filesystem leaves the content alone
        let temp_dir = tempfile::tempdir()?;
        let native = NativeFileSystem::new(temp_dir.path());
        native.write_file(Path::new("keep"), b"x")?;
        native.cleanup()?;
        assert!(temp_dir.path().join("keep").exists());
        Ok(())
    }
}
