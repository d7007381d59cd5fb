//! `ocmutils::error` is a module containing error utilities for the ocmstore project.

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of an ocmutils-related operation.
pub type UtilsResult<T> = Result<T, UtilsError>;

/// An error that occurred in one of the utilities.
#[derive(pretty_error_debug::Debug, Error)]
pub enum UtilsError {
    /// The view has already been closed
    #[error("view already closed")]
    ViewClosed,

    /// The last view of the object has been closed and the object is released
    #[error("object already released")]
    ObjectReleased,

    /// Custom error.
    #[error("Custom error: {0}")]
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

impl UtilsError {
    /// Creates a new `Err` result.
    pub fn custom(error: impl Into<anyhow::Error>) -> UtilsError {
        UtilsError::Custom(AnyError::new(error))
    }
}

impl AnyError {
    /// Wraps any error.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Downcasts the error to a `T`.
    pub fn downcast<T>(&self) -> Option<&T>
    where
        T: Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<T>()
    }

    /// Returns the wrapped error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.error
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `UtilsResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> UtilsResult<T> {
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
