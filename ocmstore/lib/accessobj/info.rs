use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

use virtualfs::VirtualFileSystem;

use crate::OcmResult;

use super::{AccessMode, DescriptorState, FileStateAccess, State, StateHandler};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Describes the layout of a kind of access object.
///
/// The info names the descriptor file and the element directory, knows how to prepare a fresh
/// filesystem and how to load the descriptor.
pub trait AccessObjectInfo: Debug + Send + Sync {
    /// Returns the name of the descriptor file at the root of the filesystem.
    fn descriptor_file_name(&self) -> &str;

    /// Returns the human readable name of the object type.
    fn object_type_name(&self) -> &str;

    /// Returns the name of the directory holding the elements.
    fn element_directory_name(&self) -> &str;

    /// Returns the human readable name of the elements.
    fn element_type_name(&self) -> &str;

    /// Returns further files at the root of the filesystem that belong to the object.
    fn additional_files(&self, _fs: &dyn VirtualFileSystem) -> Vec<String> {
        Vec::new()
    }

    /// Adapts the info to conventions found in an existing filesystem.
    fn setup_for(&mut self, _fs: &dyn VirtualFileSystem) -> OcmResult<()> {
        Ok(())
    }

    /// Prepares a fresh, writable filesystem.
    fn setup_file_system(&mut self, fs: &dyn VirtualFileSystem) -> OcmResult<()> {
        fs.create_directory_all(Path::new(self.element_directory_name()))?;
        Ok(())
    }

    /// Loads the descriptor state from the filesystem.
    fn setup_descriptor_state(
        &self,
        mode: AccessMode,
        fs: Arc<dyn VirtualFileSystem>,
    ) -> OcmResult<Box<dyn DescriptorState>>;

    /// Returns the path of the element with the given file name.
    fn sub_path(&self, name: &str) -> PathBuf {
        Path::new(self.element_directory_name()).join(name)
    }

    /// Checks that `data` is a valid descriptor.
    fn validate_descriptor(&self, data: &[u8]) -> OcmResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An [`AccessObjectInfo`] for objects whose descriptor is handled by a [`StateHandler`].
#[derive(Debug, Clone)]
pub struct DefaultAccessObjectInfo<H> {
    descriptor_file_name: String,
    object_type_name: String,
    element_directory_name: String,
    element_type_name: String,
    additional_files: Vec<String>,
    handler: H,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<H: StateHandler> DefaultAccessObjectInfo<H> {
    /// Creates an info for objects with the given layout.
    ///
    /// ## Arguments
    ///
    /// * `descriptor_file_name` - The descriptor file at the root of the filesystem
    /// * `object_type_name` - The name used for the object in messages
    /// * `element_directory_name` - The directory holding the elements
    /// * `element_type_name` - The name used for elements in messages
    /// * `handler` - The handler of the descriptor
    pub fn new(
        descriptor_file_name: impl Into<String>,
        object_type_name: impl Into<String>,
        element_directory_name: impl Into<String>,
        element_type_name: impl Into<String>,
        handler: H,
    ) -> Self {
        Self {
            descriptor_file_name: descriptor_file_name.into(),
            object_type_name: object_type_name.into(),
            element_directory_name: element_directory_name.into(),
            element_type_name: element_type_name.into(),
            additional_files: Vec::new(),
            handler,
        }
    }

    /// Adds a further file belonging to the object.
    pub fn with_additional_file(mut self, name: impl Into<String>) -> Self {
        self.additional_files.push(name.into());
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<H: StateHandler> AccessObjectInfo for DefaultAccessObjectInfo<H> {
    fn descriptor_file_name(&self) -> &str {
        &self.descriptor_file_name
    }

    fn object_type_name(&self) -> &str {
        &self.object_type_name
    }

    fn element_directory_name(&self) -> &str {
        &self.element_directory_name
    }

    fn element_type_name(&self) -> &str {
        &self.element_type_name
    }

    fn additional_files(&self, _fs: &dyn VirtualFileSystem) -> Vec<String> {
        self.additional_files.clone()
    }

    fn setup_descriptor_state(
        &self,
        mode: AccessMode,
        fs: Arc<dyn VirtualFileSystem>,
    ) -> OcmResult<Box<dyn DescriptorState>> {
        let access = FileStateAccess::new(fs, &self.descriptor_file_name);
        let state = State::new(mode, Arc::new(access), self.handler.clone())?;
        Ok(Box::new(state))
    }

    fn validate_descriptor(&self, data: &[u8]) -> OcmResult<()> {
        self.handler.decode(data).map(|_| ())
    }
}
