//! Blob and data access abstractions.

use std::{
    fmt::Debug,
    io::{self, Read},
    path::PathBuf,
    sync::Arc,
};

use bytes::Bytes;
use getset::Getters;
use oci_spec::image::Digest;
use virtualfs::VirtualFileSystem;

use crate::{digest, OcmResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Media type used for blobs without a more specific type.
pub const MIME_OCTET: &str = "application/octet-stream";

/// Media type of JSON documents.
pub const MIME_JSON: &str = "application/json";

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Access to a sequence of bytes.
pub trait DataAccess: Debug + Send + Sync {
    /// Opens a reader on the content.
    fn reader(&self) -> OcmResult<Box<dyn Read + Send>>;

    /// Reads the complete content into memory.
    fn get(&self) -> OcmResult<Vec<u8>> {
        let mut data = Vec::new();
        self.reader()?.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Data with a known digest, size and media type.
pub trait BlobAccess: DataAccess {
    /// Returns the digest of the content.
    fn digest(&self) -> Digest;

    /// Returns the size of the content in bytes.
    fn size(&self) -> u64;

    /// Returns the media type of the content.
    fn mime_type(&self) -> &str;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-memory blob.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BlobData {
    /// The media type.
    mime_type: String,

    /// The content.
    data: Bytes,

    /// The digest of the content.
    digest: Digest,
}

/// Data stored in a file of a virtual filesystem.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct FileDataAccess {
    /// The filesystem holding the file.
    fs: Arc<dyn VirtualFileSystem>,

    /// The path of the file.
    path: PathBuf,
}

/// A blob backed by some data access whose digest and size are already known.
#[derive(Debug, Clone)]
pub struct DataBlob {
    data: Arc<dyn DataAccess>,
    digest: Digest,
    size: u64,
    mime_type: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BlobData {
    /// Creates a blob for `data` and computes its sha256 digest.
    pub fn for_data(mime_type: impl Into<String>, data: impl Into<Bytes>) -> OcmResult<Self> {
        let data = data.into();
        let digest = digest::for_bytes(&data)?;
        Ok(Self {
            mime_type: mime_type.into(),
            data,
            digest,
        })
    }

    /// Creates a blob holding the bytes of `content`.
    pub fn for_string(mime_type: impl Into<String>, content: impl Into<String>) -> OcmResult<Self> {
        Self::for_data(mime_type, content.into())
    }
}

impl FileDataAccess {
    /// Creates access to the file at `path` in `fs`.
    pub fn new(fs: Arc<dyn VirtualFileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }
}

impl DataBlob {
    /// Creates a blob for `data` with the given digest, size and media type.
    pub fn new(
        data: Arc<dyn DataAccess>,
        digest: Digest,
        size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            data,
            digest,
            size,
            mime_type: mime_type.into(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl DataAccess for BlobData {
    fn reader(&self) -> OcmResult<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }

    fn get(&self) -> OcmResult<Vec<u8>> {
        Ok(self.data.to_vec())
    }
}

impl BlobAccess for BlobData {
    fn digest(&self) -> Digest {
        self.digest.clone()
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl DataAccess for FileDataAccess {
    fn reader(&self) -> OcmResult<Box<dyn Read + Send>> {
        Ok(self.fs.open_file(&self.path)?)
    }
}

impl DataAccess for DataBlob {
    fn reader(&self) -> OcmResult<Box<dyn Read + Send>> {
        self.data.reader()
    }
}

impl BlobAccess for DataBlob {
    fn digest(&self) -> Digest {
        self.digest.clone()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
