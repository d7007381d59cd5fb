use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ocmutils::{ErrorList, Retriable, RetriableError, UtilsError};
use thiserror::Error;
use virtualfs::VfsError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Kind of errors about blobs.
pub const KIND_BLOB: &str = "blob";

/// Kind of errors about artifacts.
pub const KIND_ARTIFACT: &str = "artifact";

/// Kind of errors about file formats.
pub const KIND_FILEFORMAT: &str = "file format";

/// Kind of errors about descriptors.
pub const KIND_DESCRIPTOR: &str = "descriptor";

/// Kind of errors about files.
pub const KIND_FILE: &str = "file";

/// Kind of errors about digests.
pub const KIND_DIGEST: &str = "digest";

/// Kind of errors about archive structure formats.
pub const KIND_STRUCTURE_FORMAT: &str = "structure format";

/// Kind of errors about namespaces.
pub const KIND_NAMESPACE: &str = "namespace";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an ocmstore-related operation.
pub type OcmResult<T> = Result<T, OcmError>;

/// An error that occurred while accessing an access object, an artifact set or a repository.
#[derive(pretty_error_debug::Debug, Error)]
pub enum OcmError {
    /// The object has already been closed
    #[error("closed")]
    Closed,

    /// A mutation was attempted on an object opened read-only
    #[error("read only")]
    ReadOnly,

    /// An element is missing
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// The kind of the missing element
        kind: &'static str,

        /// The name of the missing element
        name: String,
    },

    /// An element is missing in a namespace
    #[error("{kind} \"{name}\" not found in {namespace}")]
    NotFoundIn {
        /// The kind of the missing element
        kind: &'static str,

        /// The name of the missing element
        name: String,

        /// The namespace that was searched
        namespace: String,
    },

    /// An element is not known
    #[error("unknown {kind} \"{name}\"")]
    Unknown {
        /// The kind of the unknown element
        kind: &'static str,

        /// The name of the unknown element
        name: String,
    },

    /// An element already exists
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists {
        /// The kind of the element
        kind: &'static str,

        /// The name of the element
        name: String,
    },

    /// A structural error, for example a malformed descriptor
    #[error("invalid {kind}: {reason}")]
    Invalid {
        /// The kind of the invalid element
        kind: &'static str,

        /// What is wrong
        reason: String,
    },

    /// An archive does not contain the descriptor file
    #[error("no descriptor file ({file}) found for {path}")]
    NoDescriptorFound {
        /// The expected descriptor file name
        file: String,

        /// The archive that was searched
        path: String,
    },

    /// Blob content does not match its declared digest
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// The declared digest
        expected: String,

        /// The digest of the actual content
        actual: String,
    },

    /// Several independent failures
    #[error(transparent)]
    List(#[from] ErrorList<OcmError>),

    /// An error with operation context
    #[error("{context}: {source}")]
    Context {
        /// The operation that failed
        context: String,

        /// The underlying error
        #[source]
        source: Box<OcmError>,
    },

    /// A transient failure that may succeed when retried
    #[error(transparent)]
    Retriable(#[from] RetriableError),

    /// Virtual filesystem error
    #[error("filesystem error: {0}")]
    Vfs(#[from] VfsError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// OCI specification error
    #[error("oci spec error: {0}")]
    OciSpec(#[from] oci_spec::OciSpecError),

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

impl OcmError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> OcmError {
        OcmError::Custom(AnyError {
            error: error.into(),
        })
    }

    /// Creates a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> OcmError {
        OcmError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates an unknown element error.
    pub fn unknown(kind: &'static str, name: impl Into<String>) -> OcmError {
        OcmError::Unknown {
            kind,
            name: name.into(),
        }
    }

    /// Creates an invalid element error.
    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> OcmError {
        OcmError::Invalid {
            kind,
            reason: reason.into(),
        }
    }

    /// Wraps the error with operation context.
    pub fn with_context(self, context: impl Into<String>) -> OcmError {
        OcmError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through context wrappers and single entry lists.
    pub fn root(&self) -> &OcmError {
        match self {
            OcmError::Context { source, .. } => source.root(),
            OcmError::List(list) if list.len() == 1 => list.get_errors()[0].root(),
            e => e,
        }
    }

    /// Returns `true` if the error reports a closed object.
    pub fn is_closed(&self) -> bool {
        matches!(self.root(), OcmError::Closed)
    }

    /// Returns `true` if the error reports a read-only violation.
    pub fn is_read_only(&self) -> bool {
        matches!(self.root(), OcmError::ReadOnly)
    }

    /// Returns `true` if the error reports a missing element.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            OcmError::NotFound { .. } | OcmError::NotFoundIn { .. } => true,
            OcmError::Vfs(e) => e.is_not_found(),
            OcmError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
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

/// Creates an `Ok` `OcmResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> OcmResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Retriable for OcmError {
    fn is_retriable(&self) -> bool {
        match self {
            OcmError::Retriable(_) => true,
            OcmError::Context { source, .. } => source.is_retriable(),
            OcmError::List(list) => list.get_errors().iter().any(|e| e.is_retriable()),
            OcmError::Custom(e) => e.error.is_retriable(),
            _ => false,
        }
    }
}

impl From<UtilsError> for OcmError {
    fn from(error: UtilsError) -> Self {
        match error {
            UtilsError::ViewClosed | UtilsError::ObjectReleased => OcmError::Closed,
            e => OcmError::custom(e),
        }
    }
}

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

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates_see_through_context() {
        let err = OcmError::ReadOnly.with_context("unable to update descriptor");
        assert!(err.is_read_only());
        assert_eq!(err.to_string(), "unable to update descriptor: read only");

        let mut list = ErrorList::new("cannot close artifactset");
        list.push(OcmError::Closed);
        assert!(OcmError::List(list).is_closed());

        assert!(OcmError::not_found(KIND_BLOB, "sha256:abc").is_not_found());
        assert!(OcmError::Vfs(VfsError::NotFound("x".into())).is_not_found());
    }

    #[test]
    fn test_retriable_marker_survives_wrapping() {
        let err = OcmError::from(RetriableError::new("connection reset"))
            .with_context("unable to read blob");
        assert!(err.is_retriable());

        let mut list = ErrorList::new("cannot close repository");
        list.push(OcmError::Closed);
        list.push(err);
        assert!(OcmError::List(list).is_retriable());

        assert!(!OcmError::ReadOnly.is_retriable());
    }
}
