//! Aggregation of independent failures.

use std::{
    error::Error,
    fmt::{self, Display},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An ordered list of errors collected under a common context.
///
/// Every step of a multi-step operation records its failure instead of short-circuiting, the
/// list is turned into a single result at the end. The string form lists each cause:
/// `cannot close artifactset: {first, second}`.
#[derive(Debug)]
pub struct ErrorList<E> {
    context: String,
    errors: Vec<E>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<E> ErrorList<E> {
    /// Creates an empty list with the given context message.
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            errors: Vec::new(),
        }
    }

    /// Records the error of `result`, if any, and returns its success value.
    pub fn add<T>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Records an error.
    pub fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    /// Returns the context message.
    pub fn get_context(&self) -> &str {
        &self.context
    }

    /// Returns the collected errors in recording order.
    pub fn get_errors(&self) -> &[E] {
        &self.errors
    }

    /// Consumes the list and returns the collected errors.
    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    /// Returns the number of collected errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if no error has been recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns `Ok(())` for an empty list, the list itself otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<E: Display> Display for ErrorList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        match self.errors.as_slice() {
            [single] => write!(f, "{}", single),
            errors => {
                write!(f, "{{")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl<E: Error + 'static> Error for ErrorList<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.errors.first().map(|e| e as &(dyn Error + 'static))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_errlist_empty_is_ok() {
        let mut list: ErrorList<io::Error> = ErrorList::new("cannot close artifactset");
        assert_eq!(list.add(Ok::<_, io::Error>(3)), Some(3));
        assert!(list.into_result().is_ok());
    }

    #[test]
    fn test_errlist_lists_every_cause() {
        let mut list = ErrorList::new("cannot close repository");
        list.add(Err::<(), _>(io::Error::other("update failed")));
        list.add(Ok(()));
        list.push(io::Error::other("cleanup failed"));

        let err = list.into_result().unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(
            err.to_string(),
            "cannot close repository: {update failed, cleanup failed}"
        );
        assert_eq!(err.source().unwrap().to_string(), "update failed");
    }

    #[test]
    fn test_errlist_single_cause() {
        let mut list = ErrorList::new("cannot close blob");
        list.push(io::Error::other("closed"));
        assert_eq!(list.to_string(), "cannot close blob: closed");
    }
}
