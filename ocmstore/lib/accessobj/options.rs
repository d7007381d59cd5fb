use std::sync::Arc;

use getset::Getters;
use typed_builder::TypedBuilder;
use virtualfs::{NativeFileSystem, VirtualFileSystem};

use super::FileFormat;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Options for opening, creating and writing access objects.
///
/// ## Examples
///
/// ```
/// use std::sync::Arc;
///
/// use ocmstore::accessobj::{AccessOptions, FileFormat};
/// use virtualfs::MemoryFileSystem;
///
/// let options = AccessOptions::builder()
///     .file_format(FileFormat::Tgz)
///     .path_fs(Arc::new(MemoryFileSystem::new()))
///     .build();
///
/// assert_eq!(options.get_file_format(), Some(FileFormat::Tgz));
/// ```
#[derive(Debug, Clone, TypedBuilder, Getters)]
pub struct AccessOptions {
    /// The format to use. Detected from the existing object if not set.
    #[builder(default, setter(strip_option))]
    file_format: Option<FileFormat>,

    /// The filesystem that paths passed to format handlers refer to.
    #[builder(default = default_path_fs())]
    #[getset(get = "pub with_prefix")]
    path_fs: Arc<dyn VirtualFileSystem>,

    /// A filesystem to extract archives into instead of a temporary one.
    #[builder(default, setter(strip_option))]
    #[getset(get = "pub with_prefix")]
    representation: Option<Arc<dyn VirtualFileSystem>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AccessOptions {
    /// Returns the configured file format.
    pub fn get_file_format(&self) -> Option<FileFormat> {
        self.file_format
    }

    /// Returns a copy with the file format set to `format`.
    pub fn with_file_format(&self, format: FileFormat) -> Self {
        Self {
            file_format: Some(format),
            ..self.clone()
        }
    }

    /// Returns a copy with the file format set to `format` unless one is configured already.
    pub fn with_default_file_format(&self, format: FileFormat) -> Self {
        Self {
            file_format: Some(self.file_format.unwrap_or(format)),
            ..self.clone()
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn default_path_fs() -> Arc<dyn VirtualFileSystem> {
    Arc::new(NativeFileSystem::new("."))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for AccessOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
