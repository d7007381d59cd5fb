use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a file system operation.
pub type VfsResult<T> = Result<T, VfsError>;

/// An error that occurred during a file system operation.
#[derive(pretty_error_debug::Debug, Error)]
pub enum VfsError {
    /// The parent directory does not exist
    #[error("parent directory does not exist: {0}")]
    ParentDirectoryNotFound(PathBuf),

    /// The path already exists
    #[error("path already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The path does not exist
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    /// The path is not a directory
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The path is not a file
    #[error("path is not a file: {0}")]
    NotAFile(PathBuf),

    /// The directory is not empty
    #[error("directory is not empty: {0}")]
    NotEmpty(PathBuf),

    /// Empty path segment
    #[error("empty path segment")]
    EmptyPathSegment,

    /// Invalid path component (e.g. "..", "/" inside a segment)
    #[error("invalid path component: {0}")]
    InvalidPathComponent(String),

    /// IO error during filesystem operation
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Custom error.
    #[error(transparent)]
    Custom(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VfsError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> VfsError {
        VfsError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Returns `true` if the error reports a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) | VfsError::ParentDirectoryNotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Maps an io error raised while operating on `path` to the matching variant.
    pub fn from_io(error: io::Error, path: impl Into<PathBuf>) -> VfsError {
        match error.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.into()),
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(path.into()),
            _ => VfsError::Io(error),
        }
    }
}

impl AnyError {
    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `VfsResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> VfsResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

impl From<VfsError> for io::Error {
    fn from(error: VfsError) -> Self {
        match error {
            VfsError::Io(e) => e,
            VfsError::NotFound(_) | VfsError::ParentDirectoryNotFound(_) => {
                io::Error::new(io::ErrorKind::NotFound, error)
            }
            VfsError::AlreadyExists(_) => io::Error::new(io::ErrorKind::AlreadyExists, error),
            VfsError::InvalidPathComponent(_) | VfsError::EmptyPathSegment => {
                io::Error::new(io::ErrorKind::InvalidInput, error)
            }
            _ => io::Error::other(error),
        }
    }
}
