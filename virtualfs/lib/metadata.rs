use getset::{CopyGetters, Getters};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The kind of an entry in a virtual filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// A regular file.
    File,

    /// A directory.
    Directory,
}

/// Metadata of a file or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub with_prefix")]
pub struct Metadata {
    /// The kind of the entry.
    entity_type: EntityType,

    /// The size of the file content in bytes. Always `0` for directories.
    size: u64,
}

/// An entry returned when reading a directory.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct DirEntry {
    /// The name of the entry inside its directory.
    name: String,

    /// The metadata of the entry.
    metadata: Metadata,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Metadata {
    /// Creates new metadata.
    pub fn new(entity_type: EntityType, size: u64) -> Self {
        Self { entity_type, size }
    }

    /// Returns `true` if the entry is a regular file.
    pub fn is_file(&self) -> bool {
        self.entity_type == EntityType::File
    }

    /// Returns `true` if the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.entity_type == EntityType::Directory
    }
}

impl DirEntry {
    /// Creates a new directory entry.
    pub fn new(name: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            name: name.into(),
            metadata,
        }
    }

    /// Returns `true` if the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}
