use std::{
    fmt::Debug,
    io::{Read, Write},
    path::Path,
};

use crate::{DirEntry, Metadata, VfsError, VfsResult};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A trait that defines the interface for a virtual file system implementation.
///
/// The `VirtualFileSystem` trait provides a set of blocking operations for interacting with
/// files and directories in an abstract file system. This abstraction allows for different
/// implementations such as in-memory filesystems, projections of other filesystems, or
/// traditional disk-based filesystems while maintaining a consistent interface.
///
/// Paths are always interpreted relative to the root of the filesystem. A leading `/` is ignored
/// and traversal above the root is rejected.
pub trait VirtualFileSystem: Debug + Send + Sync {
    /// Checks if a file or directory exists at the specified path.
    ///
    /// ## Arguments
    ///
    /// * `path` - The path to check for existence
    ///
    /// ## Returns
    ///
    /// * `Ok(true)` if the path exists
    /// * `Ok(false)` if the path does not exist
    /// * `Err` if the check operation fails
    fn exists(&self, path: &Path) -> VfsResult<bool>;

    /// Retrieves the metadata of a file or directory.
    ///
    /// ## Errors
    ///
    /// Returns [`VfsError::NotFound`] if the path does not exist.
    fn get_metadata(&self, path: &Path) -> VfsResult<Metadata>;

    /// Creates a new directory at the specified path.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The parent directory doesn't exist
    /// - A file or directory already exists at the path
    fn create_directory(&self, path: &Path) -> VfsResult<()>;

    /// Creates a directory and all of its missing parents.
    ///
    /// Succeeds if the directory already exists.
    ///
    /// ## Errors
    ///
    /// Returns [`VfsError::NotADirectory`] if a file is in the way.
    fn create_directory_all(&self, path: &Path) -> VfsResult<()>;

    /// Lists the contents of a directory.
    ///
    /// ## Returns
    ///
    /// The entries of the directory sorted by name.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The path doesn't exist
    /// - The path is not a directory
    fn read_directory(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Opens a file for reading.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The path is a directory
    fn open_file(&self, path: &Path) -> VfsResult<Box<dyn Read + Send>>;

    /// Creates a file, or truncates an existing one, and opens it for writing.
    ///
    /// The written content is visible to other readers once the writer is flushed or dropped.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The parent directory doesn't exist
    /// - The path is a directory
    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn Write + Send>>;

    /// Removes a file or an empty directory.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - The path doesn't exist
    /// - The path is a non-empty directory
    fn remove(&self, path: &Path) -> VfsResult<()>;

    /// Removes a file or a directory including its content.
    ///
    /// Succeeds if the path does not exist.
    fn remove_all(&self, path: &Path) -> VfsResult<()>;

    /// Releases the resources of a filesystem that is a temporary resource.
    ///
    /// Filesystems that do not own their content treat this as a no-op.
    fn cleanup(&self) -> VfsResult<()>;

    /// Checks if a regular file exists at the specified path.
    fn is_file(&self, path: &Path) -> VfsResult<bool> {
        match self.get_metadata(path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Checks if a directory exists at the specified path.
    fn is_dir(&self, path: &Path) -> VfsResult<bool> {
        match self.get_metadata(path) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads the complete content of a file.
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let mut reader = self.open_file(path)?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Creates or truncates a file and writes the given content.
    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let mut writer = self.create_file(path)?;
        writer.write_all(content)?;
        writer.flush()?;
        Ok(())
    }
}
