use std::{
    io::{self, Read},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use oci_spec::image::Digest;
use ocmutils::{retry, Backoff};
use virtualfs::VirtualFileSystem;

use crate::{
    blob::{BlobAccess, FileDataAccess},
    digest::{self, DigestWriter},
    OcmError, OcmResult, KIND_BLOB,
};

use super::{AccessObject, AccessOptions};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A content-addressed blob store in the element directory of an access object.
///
/// Blobs are stored once under the path derived from their digest. All operations are
/// serialized by a lock on the access object, which [`FileSystemBlobAccess::lock`] exposes for
/// read-modify-write sequences spanning the descriptor and the blobs.
#[derive(Debug)]
pub struct FileSystemBlobAccess {
    access: Mutex<AccessObject>,
    backoff: Backoff,
}

/// Exclusive access to the access object of a [`FileSystemBlobAccess`].
pub struct LockedBlobAccess<'a> {
    access: MutexGuard<'a, AccessObject>,
    backoff: &'a Backoff,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FileSystemBlobAccess {
    /// Creates a blob store on `access`.
    pub fn new(access: AccessObject) -> Self {
        Self {
            access: Mutex::new(access),
            backoff: Backoff::default(),
        }
    }

    /// Sets the policy for retrying blob reads that fail with retriable errors.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Locks the access object.
    pub fn lock(&self) -> LockedBlobAccess<'_> {
        LockedBlobAccess {
            access: self.access.lock().unwrap_or_else(PoisonError::into_inner),
            backoff: &self.backoff,
        }
    }

    /// Returns `true` once the access object has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }

    /// Returns `true` if the access object rejects mutations.
    pub fn is_read_only(&self) -> bool {
        self.lock().is_read_only()
    }

    /// Stores a blob. See [`LockedBlobAccess::add_blob`].
    pub fn add_blob(&self, blob: &dyn BlobAccess) -> OcmResult<()> {
        self.lock().add_blob(blob)
    }

    /// Returns the size of a stored blob and access to its content.
    pub fn get_blob_data(&self, digest: &Digest) -> OcmResult<(u64, FileDataAccess)> {
        self.lock().get_blob_data(digest)
    }

    /// Returns `true` if a blob with the given digest is stored.
    pub fn has_blob(&self, digest: &Digest) -> OcmResult<bool> {
        self.lock().has_blob(digest)
    }

    /// Persists the descriptor if it changed.
    pub fn update(&self) -> OcmResult<bool> {
        self.lock().update()
    }

    /// Writes the access object to `path`.
    pub fn write(&self, path: &Path, options: &AccessOptions) -> OcmResult<()> {
        self.lock().write(path, options)
    }

    /// Closes the access object.
    pub fn close(&self) -> OcmResult<()> {
        self.lock().close()
    }
}

impl LockedBlobAccess<'_> {
    /// Returns the path a blob with the given digest is stored under.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.access
            .get_info()
            .sub_path(&digest::to_filename(digest))
    }

    /// Stores a blob.
    ///
    /// Storing a blob whose digest is already present does nothing. Otherwise the content is
    /// streamed into the store and checked against the declared digest.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::Closed`] or [`OcmError::ReadOnly`] before touching the
    /// filesystem, and with [`OcmError::DigestMismatch`] if the content does not match. No
    /// partial file is left behind on failure.
    pub fn add_blob(&self, blob: &dyn BlobAccess) -> OcmResult<()> {
        self.access.check_writable()?;
        let fs = self.access.get_file_system()?;
        let digest = blob.digest();
        let path = self.blob_path(&digest);

        if fs.exists(&path)? {
            tracing::trace!("blob {} already present", digest);
            return Ok(());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs.create_directory_all(parent)?;
        }

        let mut reader = retry(self.backoff, || blob.reader())?;
        match store(fs.as_ref(), &path, &mut reader, &digest) {
            Ok(size) => {
                tracing::debug!("added blob {} ({} bytes)", digest, size);
                Ok(())
            }
            Err(e) => {
                if let Err(re) = fs.remove(&path) {
                    if !re.is_not_found() {
                        tracing::warn!("failed to remove partial blob {}: {}", path.display(), re);
                    }
                }
                Err(e.with_context(format!("unable to add blob {digest}")))
            }
        }
    }

    /// Returns the size of a stored blob and access to its content.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::Closed`] on closed objects and with a not found error for unknown
    /// digests.
    pub fn get_blob_data(&self, digest: &Digest) -> OcmResult<(u64, FileDataAccess)> {
        self.access.check_open()?;
        let fs = self.access.get_file_system()?;
        let path = self.blob_path(digest);

        match fs.get_metadata(&path) {
            Ok(metadata) if metadata.is_file() => Ok((
                metadata.get_size(),
                FileDataAccess::new(Arc::clone(fs), path),
            )),
            Ok(_) => Err(OcmError::not_found(KIND_BLOB, digest.to_string())),
            Err(e) if e.is_not_found() => Err(OcmError::not_found(KIND_BLOB, digest.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `true` if a blob with the given digest is stored.
    pub fn has_blob(&self, digest: &Digest) -> OcmResult<bool> {
        self.access.check_open()?;
        Ok(self.access.get_file_system()?.is_file(&self.blob_path(digest))?)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn store(
    fs: &dyn VirtualFileSystem,
    path: &Path,
    reader: &mut dyn Read,
    expected: &Digest,
) -> OcmResult<u64> {
    let file = fs.create_file(path)?;
    let mut writer = DigestWriter::new(file, expected.algorithm())?;
    io::copy(reader, &mut writer)?;
    let (file, actual, size) = writer.finish()?;
    drop(file);

    if actual != *expected {
        return Err(OcmError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(size)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Deref for LockedBlobAccess<'_> {
    type Target = AccessObject;

    fn deref(&self) -> &AccessObject {
        &self.access
    }
}

impl DerefMut for LockedBlobAccess<'_> {
    fn deref_mut(&mut self) -> &mut AccessObject {
        &mut self.access
    }
}
