//! Reference counted views on objects with a single physical close.

use std::{
    fmt,
    ops::Deref,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::UtilsError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A logical handle on a shared [`Closeable`] object.
///
/// Every view must be closed explicitly. The object itself is closed when the last view is
/// closed, never by dropping a view.
pub struct View<T: Closeable> {
    shared: Arc<Shared<T>>,
    closed: AtomicBool,
}

struct Shared<T> {
    object: T,
    refs: Mutex<usize>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// An object with a single, physical close operation.
pub trait Closeable {
    /// The error returned by [`Closeable::close`].
    type Error: From<UtilsError>;

    /// Physically closes the object.
    fn close(&self) -> Result<(), Self::Error>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<T: Closeable> View<T> {
    /// Wraps the object and returns its first view.
    pub fn new(object: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                object,
                refs: Mutex::new(1),
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates an additional view on the same object.
    ///
    /// ## Errors
    ///
    /// Fails if this view is closed or the object has already been released.
    pub fn dup(&self) -> Result<Self, UtilsError> {
        if self.is_closed() {
            return Err(UtilsError::ViewClosed);
        }

        let mut refs = self.shared.refs.lock().unwrap_or_else(PoisonError::into_inner);
        if *refs == 0 {
            return Err(UtilsError::ObjectReleased);
        }
        *refs += 1;

        Ok(Self {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        })
    }

    /// Closes this view. Closing the last view closes the object.
    ///
    /// ## Errors
    ///
    /// Fails with [`UtilsError::ViewClosed`] if this view was already closed, or with the error of
    /// the physical close.
    pub fn close(&self) -> Result<(), T::Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(UtilsError::ViewClosed.into());
        }

        let last = {
            let mut refs = self.shared.refs.lock().unwrap_or_else(PoisonError::into_inner);
            *refs = refs.saturating_sub(1);
            *refs == 0
        };

        if last {
            tracing::debug!("last view closed, closing object");
            self.shared.object.close()
        } else {
            Ok(())
        }
    }

    /// Returns `true` if this view has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the number of open views on the object.
    pub fn ref_count(&self) -> usize {
        *self.shared.refs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if both views refer to the same object.
    pub fn same_object(&self, other: &View<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<T: Closeable> Deref for View<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.shared.object
    }
}

impl<T: Closeable + fmt::Debug> fmt::Debug for View<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("object", &self.shared.object)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Closeable> Drop for View<T> {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!("view dropped without being closed");
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
