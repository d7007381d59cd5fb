use std::{io::Read, path::Path};

use ocmutils::{Closeable, View};

use crate::{
    accessobj::{
        AccessMode, AccessObject, AccessOptions, DefaultAccessObjectInfo, FileSystemBlobAccess,
        FormatRegistry,
    },
    artifactset::BLOBS_DIRECTORY_NAME,
    blob::{BlobAccess, DataAccess},
    OcmError, OcmResult, KIND_NAMESPACE,
};

use super::{Namespace, RepositoryIndex, RepositoryIndexHandler};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The descriptor file of common transport format archives.
pub const ARTIFACT_INDEX_FILE_NAME: &str = "artifact-index.json";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A common transport format archive holding the artifacts of many namespaces.
///
/// A `Repository` is a view on the archive. [`Repository::dup`] and
/// [`Repository::lookup_namespace`] hand out further views, and the archive is only written
/// and released once all of them have been closed.
#[derive(Debug)]
pub struct Repository {
    view: View<RepositoryImpl>,
}

/// The archive shared by all views.
#[derive(Debug)]
pub(super) struct RepositoryImpl {
    base: FileSystemBlobAccess,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Repository {
    /// Opens the archive at `path`, creating it if it is missing and `mode` allows it.
    ///
    /// ## Arguments
    ///
    /// * `mode` - The access mode
    /// * `path` - The path of the archive in the options' path filesystem
    /// * `options` - The file format and filesystems
    ///
    /// ## Errors
    ///
    /// Fails if the path is missing without [`AccessMode::CREATE`], if its format cannot be
    /// detected or if its index is invalid.
    pub fn open(
        mode: AccessMode,
        path: impl AsRef<Path>,
        options: &AccessOptions,
    ) -> OcmResult<Self> {
        let obj = FormatRegistry::global().open_or_create(
            Box::new(repository_info()),
            mode,
            path.as_ref(),
            options,
        )?;
        Ok(Self::from_access_object(obj))
    }

    /// Creates a new archive at `path`.
    pub fn create(path: impl AsRef<Path>, options: &AccessOptions) -> OcmResult<Self> {
        let obj =
            FormatRegistry::global().create(Box::new(repository_info()), path.as_ref(), options)?;
        Ok(Self::from_access_object(obj))
    }

    /// Opens a serialized archive read-only.
    ///
    /// Media types ending with `+gzip` are read as compressed archives.
    pub fn open_from_data(
        data: &dyn DataAccess,
        mime_type: &str,
        options: &AccessOptions,
    ) -> OcmResult<Self> {
        Self::open_from_reader(data.reader()?, mime_type, options)
    }

    /// Opens an archive stored in a blob read-only.
    pub fn open_from_blob(blob: &dyn BlobAccess, options: &AccessOptions) -> OcmResult<Self> {
        Self::open_from_reader(blob.reader()?, blob.mime_type(), options)
    }

    /// Wraps an access object whose descriptor is a [`RepositoryIndex`].
    pub fn from_access_object(obj: AccessObject) -> Self {
        Self {
            view: View::new(RepositoryImpl {
                base: FileSystemBlobAccess::new(obj),
            }),
        }
    }

    /// Creates another view on the archive.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::Closed`] if this view is closed.
    pub fn dup(&self) -> OcmResult<Self> {
        Ok(Self {
            view: self.view.dup()?,
        })
    }

    /// Returns `true` once this view or the archive has been closed.
    pub fn is_closed(&self) -> bool {
        self.view.is_closed() || self.view.base.is_closed()
    }

    /// Returns `true` if the archive was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.view.base.is_read_only()
    }

    /// Persists the index if it changed.
    pub fn update(&self) -> OcmResult<bool> {
        self.check_open()?;
        self.view.base.update()
    }

    /// Writes the archive to `path` in the file format of `options`.
    pub fn write(&self, path: impl AsRef<Path>, options: &AccessOptions) -> OcmResult<()> {
        self.check_open()?;
        self.view.base.write(path.as_ref(), options)
    }

    /// Closes this view. Closing the last view writes and releases the archive.
    pub fn close(&self) -> OcmResult<()> {
        self.view.close()
    }

    /// Returns a copy of the index.
    pub fn get_index(&self) -> OcmResult<RepositoryIndex> {
        self.check_open()?;
        self.view.read(RepositoryIndex::clone)
    }

    /// Returns the names of all namespaces with artifacts, sorted.
    pub fn repositories(&self) -> OcmResult<Vec<String>> {
        self.check_open()?;
        self.view.read(RepositoryIndex::get_repositories)
    }

    /// Returns `true` if `reference` selects an artifact in `namespace`.
    pub fn exists_artifact(&self, namespace: &str, reference: &str) -> OcmResult<bool> {
        self.check_open()?;
        self.view
            .read(|index| index.get_artifact_info(namespace, reference).is_some())
    }

    /// Returns access to a namespace. The namespace does not have to exist yet.
    ///
    /// The namespace holds its own view on the archive and has to be closed separately.
    ///
    /// ## Errors
    ///
    /// Fails with an invalid namespace error for blank names or names with leading or trailing
    /// whitespace.
    pub fn lookup_namespace(&self, name: &str) -> OcmResult<Namespace> {
        self.check_open()?;
        if name.trim().is_empty() || name.trim() != name {
            return Err(OcmError::invalid(
                KIND_NAMESPACE,
                format!("invalid namespace name {name:?}"),
            ));
        }
        Ok(Namespace::new(self.view.dup()?, name))
    }

    fn open_from_reader(
        reader: Box<dyn Read + Send>,
        mime_type: &str,
        options: &AccessOptions,
    ) -> OcmResult<Self> {
        let obj = FormatRegistry::global().open_from_data(
            Box::new(repository_info()),
            mime_type,
            reader,
            options,
        )?;
        Ok(Self::from_access_object(obj))
    }

    fn check_open(&self) -> OcmResult<()> {
        if self.view.is_closed() {
            return Err(OcmError::Closed);
        }
        Ok(())
    }
}

impl RepositoryImpl {
    pub(super) fn base(&self) -> &FileSystemBlobAccess {
        &self.base
    }

    pub(super) fn read<T>(&self, f: impl FnOnce(&RepositoryIndex) -> T) -> OcmResult<T> {
        let access = self.base.lock();
        let state = access.state::<RepositoryIndexHandler>()?;
        Ok(f(state.get_state()))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn repository_info() -> DefaultAccessObjectInfo<RepositoryIndexHandler> {
    DefaultAccessObjectInfo::new(
        ARTIFACT_INDEX_FILE_NAME,
        "repository",
        BLOBS_DIRECTORY_NAME,
        "blob",
        RepositoryIndexHandler,
    )
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Closeable for RepositoryImpl {
    type Error = OcmError;

    fn close(&self) -> OcmResult<()> {
        self.base.close()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
