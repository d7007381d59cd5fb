use std::{
    collections::BTreeMap,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use bytes::Bytes;
use getset::Getters;

use crate::{
    path_segments, DirEntry, EntityType, Metadata, PathSegment, VfsError, VfsResult,
    VirtualFileSystem,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-memory implementation of a virtual file system.
///
/// This implementation stores all files and directories in memory, making it useful for
/// testing and temporary file systems that don't need persistence. Clones share the same tree.
#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub with_prefix")]
pub struct MemoryFileSystem {
    /// The root directory of the file system
    root_dir: Arc<RwLock<Dir>>,
}

/// Represents a directory in the memory file system.
///
/// Entries are kept ordered by name so that listings are deterministic.
#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Dir {
    /// Map of path segments to directory entries
    entries: BTreeMap<PathSegment, Entity>,
}

/// Represents a file in the memory file system.
#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub with_prefix")]
pub struct File {
    /// Content of the file
    content: Bytes,
}

/// Represents an entity in the memory file system.
#[derive(Debug, Clone)]
pub enum Entity {
    /// A directory containing other entities
    Dir(Dir),

    /// A file containing data
    File(File),
}

/// A writer that publishes its buffer into the tree on flush and on drop.
struct MemoryFileWriter {
    root_dir: Arc<RwLock<Dir>>,
    path: Vec<PathSegment>,
    buffer: Vec<u8>,
    dirty: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryFileSystem {
    /// Creates a new empty memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_root(&self) -> RwLockReadGuard<'_, Dir> {
        self.root_dir.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_root(&self) -> RwLockWriteGuard<'_, Dir> {
        self.root_dir.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl File {
    /// Creates a new file with the given content.
    pub fn with_content(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Entity {
    /// Returns the metadata describing this entity.
    pub fn metadata(&self) -> Metadata {
        match self {
            Entity::Dir(_) => Metadata::new(EntityType::Directory, 0),
            Entity::File(file) => Metadata::new(EntityType::File, file.content.len() as u64),
        }
    }
}

impl Dir {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves an entity of this directory by name.
    pub fn get(&self, name: &PathSegment) -> Option<&Entity> {
        self.entries.get(name)
    }

    /// Adds a new entity to the directory.
    ///
    /// ## Errors
    ///
    /// Returns [`VfsError::AlreadyExists`] if an entry with the same name exists.
    pub fn put(&mut self, name: PathSegment, entity: Entity) -> VfsResult<()> {
        if self.entries.contains_key(&name) {
            return Err(VfsError::AlreadyExists(PathBuf::from(name.as_str())));
        }
        self.entries.insert(name, entity);
        Ok(())
    }

    /// Traverses the given segments starting from this directory.
    ///
    /// ## Returns
    ///
    /// * `Ok(Some(&Entity))` - The entity at the path
    /// * `Ok(None)` - If the path doesn't exist
    /// * `Err(VfsError::NotADirectory)` - If a non-final segment is a file
    pub fn find(&self, segments: &[PathSegment]) -> VfsResult<Option<&Entity>> {
        let Some((name, parent)) = segments.split_last() else {
            return Err(VfsError::InvalidPathComponent("empty path provided".into()));
        };

        match self.find_dir(parent) {
            Ok(dir) => Ok(dir.get(name)),
            Err(VfsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Traverses the given segments and returns the directory found there.
    ///
    /// An empty list of segments denotes this directory itself.
    pub fn find_dir(&self, segments: &[PathSegment]) -> VfsResult<&Dir> {
        let mut current = self;
        for (i, segment) in segments.iter().enumerate() {
            current = match current.entries.get(segment) {
                Some(Entity::Dir(dir)) => dir,
                Some(Entity::File(_)) => {
                    return Err(VfsError::NotADirectory(to_path(&segments[..=i])))
                }
                None => return Err(VfsError::NotFound(to_path(&segments[..=i]))),
            };
        }
        Ok(current)
    }

    /// Mutable variant of [`Dir::find_dir`].
    pub fn find_dir_mut(&mut self, segments: &[PathSegment]) -> VfsResult<&mut Dir> {
        let mut current = self;
        for (i, segment) in segments.iter().enumerate() {
            current = match current.entries.get_mut(segment) {
                Some(Entity::Dir(dir)) => dir,
                Some(Entity::File(_)) => {
                    return Err(VfsError::NotADirectory(to_path(&segments[..=i])))
                }
                None => return Err(VfsError::NotFound(to_path(&segments[..=i]))),
            };
        }
        Ok(current)
    }
}

impl MemoryFileWriter {
    fn commit(&mut self) -> VfsResult<()> {
        let Some((name, parent)) = self.path.split_last() else {
            return Err(VfsError::NotAFile(PathBuf::new()));
        };

        let mut root = self.root_dir.write().unwrap_or_else(PoisonError::into_inner);
        let dir = root.find_dir_mut(parent)?;
        if let Some(Entity::Dir(_)) = dir.entries.get(name) {
            return Err(VfsError::NotAFile(to_path(&self.path)));
        }

        dir.entries.insert(
            name.clone(),
            Entity::File(File::with_content(self.buffer.clone())),
        );
        self.dirty = false;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn to_path(segments: &[PathSegment]) -> PathBuf {
    segments.iter().collect()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl VirtualFileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> VfsResult<bool> {
        let segments = path_segments(path)?;
        if segments.is_empty() {
            return Ok(true);
        }

        match self.read_root().find(&segments) {
            Ok(entity) => Ok(entity.is_some()),
            Err(VfsError::NotADirectory(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn get_metadata(&self, path: &Path) -> VfsResult<Metadata> {
        let segments = path_segments(path)?;
        if segments.is_empty() {
            return Ok(Metadata::new(EntityType::Directory, 0));
        }

        self.read_root()
            .find(&segments)?
            .map(Entity::metadata)
            .ok_or_else(|| VfsError::NotFound(path.to_path_buf()))
    }

    fn create_directory(&self, path: &Path) -> VfsResult<()> {
        let segments = path_segments(path)?;
        let Some((name, parent)) = segments.split_last() else {
            return Err(VfsError::AlreadyExists(path.to_path_buf()));
        };

        let mut root = self.write_root();
        let dir = root.find_dir_mut(parent).map_err(|e| match e {
            VfsError::NotFound(p) => VfsError::ParentDirectoryNotFound(p),
            e => e,
        })?;
        if dir.entries.contains_key(name) {
            return Err(VfsError::AlreadyExists(path.to_path_buf()));
        }
        dir.put(name.clone(), Entity::Dir(Dir::new()))
    }

    fn create_directory_all(&self, path: &Path) -> VfsResult<()> {
        let segments = path_segments(path)?;
        let mut root = self.write_root();
        let mut current: &mut Dir = &mut root;
        for segment in segments {
            current = match current
                .entries
                .entry(segment)
                .or_insert_with(|| Entity::Dir(Dir::new()))
            {
                Entity::Dir(dir) => dir,
                Entity::File(_) => return Err(VfsError::NotADirectory(path.to_path_buf())),
            };
        }
        Ok(())
    }

    fn read_directory(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let segments = path_segments(path)?;
        let root = self.read_root();
        let dir = root.find_dir(&segments)?;
        Ok(dir
            .entries
            .iter()
            .map(|(name, entity)| DirEntry::new(name.as_str(), entity.metadata()))
            .collect())
    }

    fn open_file(&self, path: &Path) -> VfsResult<Box<dyn Read + Send>> {
        let segments = path_segments(path)?;
        if segments.is_empty() {
            return Err(VfsError::NotAFile(path.to_path_buf()));
        }

        match self.read_root().find(&segments)? {
            Some(Entity::File(file)) => Ok(Box::new(Cursor::new(file.content.clone()))),
            Some(Entity::Dir(_)) => Err(VfsError::NotAFile(path.to_path_buf())),
            None => Err(VfsError::NotFound(path.to_path_buf())),
        }
    }

    fn create_file(&self, path: &Path) -> VfsResult<Box<dyn Write + Send>> {
        let segments = path_segments(path)?;
        let Some((name, parent)) = segments.split_last() else {
            return Err(VfsError::NotAFile(path.to_path_buf()));
        };

        {
            let mut root = self.write_root();
            let dir = root.find_dir_mut(parent).map_err(|e| match e {
                VfsError::NotFound(p) => VfsError::ParentDirectoryNotFound(p),
                e => e,
            })?;
            if let Some(Entity::Dir(_)) = dir.entries.get(name) {
                return Err(VfsError::NotAFile(path.to_path_buf()));
            }
            dir.entries
                .insert(name.clone(), Entity::File(File::default()));
        }

        Ok(Box::new(MemoryFileWriter {
            root_dir: Arc::clone(&self.root_dir),
            path: segments,
            buffer: Vec::new(),
            dirty: false,
        }))
    }

    fn remove(&self, path: &Path) -> VfsResult<()> {
        let segments = path_segments(path)?;
        let Some((name, parent)) = segments.split_last() else {
            return Err(VfsError::InvalidPathComponent("cannot remove root".into()));
        };

        let mut root = self.write_root();
        let dir = root
            .find_dir_mut(parent)
            .map_err(|_| VfsError::NotFound(path.to_path_buf()))?;
        match dir.entries.get(name) {
            None => Err(VfsError::NotFound(path.to_path_buf())),
            Some(Entity::Dir(sub)) if !sub.entries.is_empty() => {
                Err(VfsError::NotEmpty(path.to_path_buf()))
            }
            Some(_) => {
                dir.entries.remove(name);
                Ok(())
            }
        }
    }

    fn remove_all(&self, path: &Path) -> VfsResult<()> {
        let segments = path_segments(path)?;
        let mut root = self.write_root();
        let Some((name, parent)) = segments.split_last() else {
            root.entries.clear();
            return Ok(());
        };

        if let Ok(dir) = root.find_dir_mut(parent) {
            dir.entries.remove(name);
        }
        Ok(())
    }

    fn cleanup(&self) -> VfsResult<()> {
        self.write_root().entries.clear();
        Ok(())
    }
}

impl Write for MemoryFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit().map_err(io::Error::from)
    }
}

impl Drop for MemoryFileWriter {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.commit() {
                tracing::warn!("dropping unflushed content of {:?}: {}", to_path(&self.path), e);
            }
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
    fn test_memoryfs_dir_find() {
        let mut root = Dir::new();
        let mut subdir = Dir::new();
        subdir
            .put(
                PathSegment::try_from("test.txt").unwrap(),
                Entity::File(File::with_content(vec![1, 2, 3])),
            )
            .unwrap();
        root.put(PathSegment::try_from("subdir").unwrap(), Entity::Dir(subdir))
            .unwrap();

        let segments = path_segments(Path::new("subdir/test.txt")).unwrap();
        match root.find(&segments).unwrap() {
            Some(Entity::File(f)) => assert_eq!(f.get_content().to_vec(), vec![1, 2, 3]),
            _ => panic!("Expected file entity"),
        }

        let missing = path_segments(Path::new("nonexistent/path")).unwrap();
        assert!(root.find(&missing).unwrap().is_none());

        let through_file = path_segments(Path::new("subdir/test.txt/more")).unwrap();
        assert!(matches!(
            root.find(&through_file),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_memoryfs_write_and_read_file() {
        let fs = MemoryFileSystem::new();
        fs.create_directory(Path::new("blobs")).unwrap();
        fs.write_file(Path::new("blobs/sha256.abc"), b"testdata")
            .unwrap();

        assert!(fs.is_file(Path::new("blobs/sha256.abc")).unwrap());
        assert_eq!(
            fs.read_file(Path::new("/blobs/sha256.abc")).unwrap(),
            b"testdata"
        );
        assert_eq!(
            fs.get_metadata(Path::new("blobs/sha256.abc"))
                .unwrap()
                .get_size(),
            8
        );

        // Truncates existing content
        fs.write_file(Path::new("blobs/sha256.abc"), b"x").unwrap();
        assert_eq!(fs.read_file(Path::new("blobs/sha256.abc")).unwrap(), b"x");
    }

    #[test]
    fn test_memoryfs_writer_publishes_on_drop() {
        let fs = MemoryFileSystem::new();
        {
            let mut writer = fs.create_file(Path::new("index.json")).unwrap();
            writer.write_all(b"{}").unwrap();
        }
        assert_eq!(fs.read_file(Path::new("index.json")).unwrap(), b"{}");
    }

    #[test]
    fn test_memoryfs_create_file_requires_parent() {
        let fs = MemoryFileSystem::new();
        assert!(matches!(
            fs.create_file(Path::new("missing/file")),
            Err(VfsError::ParentDirectoryNotFound(_))
        ));
        fs.create_directory_all(Path::new("a/b")).unwrap();
        assert!(matches!(
            fs.create_file(Path::new("a/b")),
            Err(VfsError::NotAFile(_))
        ));
    }

    #[test]
    fn test_memoryfs_read_directory_is_sorted() {
        let fs = MemoryFileSystem::new();
        fs.create_directory_all(Path::new("blobs/sha256")).unwrap();
        fs.write_file(Path::new("blobs/zeta"), b"z").unwrap();
        fs.write_file(Path::new("blobs/alpha"), b"a").unwrap();

        let names: Vec<_> = fs
            .read_directory(Path::new("blobs"))
            .unwrap()
            .into_iter()
            .map(|e| (e.get_name().clone(), e.is_dir()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("alpha".to_string(), false),
                ("sha256".to_string(), true),
                ("zeta".to_string(), false)
            ]
        );

        assert!(matches!(
            fs.read_directory(Path::new("nothing")),
            Err(VfsError::NotFound(_))
        ));
    }

    #[test]
    fn test_memoryfs_remove() {
        let fs = MemoryFileSystem::new();
        fs.create_directory_all(Path::new("a/b")).unwrap();
        fs.write_file(Path::new("a/b/c"), b"c").unwrap();

        assert!(matches!(
            fs.remove(Path::new("a")),
            Err(VfsError::NotEmpty(_))
        ));
        fs.remove(Path::new("a/b/c")).unwrap();
        assert!(!fs.exists(Path::new("a/b/c")).unwrap());
        assert!(matches!(
            fs.remove(Path::new("a/b/c")),
            Err(VfsError::NotFound(_))
        ));

        fs.remove_all(Path::new("a")).unwrap();
        assert!(!fs.exists(Path::new("a")).unwrap());
        fs.remove_all(Path::new("a")).unwrap();
    }

    #[test]
    fn test_memoryfs_cleanup_clears_tree() {
        let fs = MemoryFileSystem::new();
        fs.create_directory(Path::new("blobs")).unwrap();
        let shared = fs.clone();
        fs.cleanup().unwrap();
        assert!(shared.read_directory(Path::new("")).unwrap().is_empty());
    }
}
