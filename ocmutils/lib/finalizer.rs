//! Ordered cleanup chains.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{AnyError, ErrorList};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

type Action = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A chain of named cleanup actions.
///
/// [`Finalizer::finalize`] runs every registered action exactly once in reverse registration
/// order. A failing action does not stop the chain, all failures are reported together.
/// Actions still pending when the finalizer is dropped are run at that point, failures are then
/// only logged.
#[derive(Default)]
pub struct Finalizer {
    actions: Arc<Mutex<Vec<(String, Action)>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Finalizer {
    /// Creates an empty finalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cleanup action.
    pub fn with<F>(&mut self, name: impl Into<String>, action: F) -> &mut Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.lock().push((name.into(), Box::new(action)));
        self
    }

    /// Creates a nested finalizer.
    ///
    /// The nested chain can be finalized on its own. Whatever is still pending in it runs when
    /// this finalizer reaches the point at which the nested chain was registered.
    pub fn nested(&mut self) -> Finalizer {
        let nested = Finalizer::new();
        let actions = Arc::clone(&nested.actions);
        self.with("nested", move || {
            let mut guard = actions.lock().unwrap_or_else(PoisonError::into_inner);
            let pending = std::mem::take(&mut *guard);
            drop(guard);
            run(pending).map_err(anyhow::Error::new)
        });
        nested
    }

    /// Returns the number of pending actions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no action is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops all pending actions without running them.
    ///
    /// Used once the guarded operation succeeded and its cleanup is no longer wanted.
    pub fn dismiss(&self) {
        let pending = std::mem::take(&mut *self.lock());
        tracing::trace!("dismissed {} finalizers", pending.len());
    }

    /// Runs all pending actions in reverse registration order.
    pub fn finalize(&self) -> Result<(), ErrorList<AnyError>> {
        let pending = std::mem::take(&mut *self.lock());
        run(pending)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Action)>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn run(actions: Vec<(String, Action)>) -> Result<(), ErrorList<AnyError>> {
    let mut errors = ErrorList::new("finalize");
    for (name, action) in actions.into_iter().rev() {
        tracing::trace!("finalizing {}", name);
        errors.add(action().map_err(|e| AnyError::new(anyhow::anyhow!("{}: {:#}", name, e))));
    }
    errors.into_result()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.lock().iter().map(|(name, _)| name.clone()).collect();
        f.debug_struct("Finalizer").field("actions", &names).finish()
    }
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!("pending finalizers failed: {}", e);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Action) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let record = {
            let log = Arc::clone(&log);
            move |name: &'static str| -> Action {
                let log = Arc::clone(&log);
                Box::new(move || {
                    log.lock().unwrap().push(name);
                    Ok(())
                })
            }
        };
        (log, record)
    }

    #[test]
    fn test_finalizer_runs_in_reverse_order() {
        let (log, record) = recorder();
        let mut finalize = Finalizer::new();
        finalize.with("file", record("file"));
        finalize.with("compressor", record("compressor"));
        finalize.with("archive", record("archive"));

        assert_eq!(finalize.len(), 3);
        finalize.finalize().unwrap();
        assert!(finalize.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["archive", "compressor", "file"]);

        // A second run has nothing left to do
        finalize.finalize().unwrap();
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_finalizer_collects_all_failures() {
        let (log, record) = recorder();
        let mut finalize = Finalizer::new();
        finalize.with("first", record("first"));
        finalize.with("broken", || Err(anyhow::anyhow!("disk full")));
        finalize.with("last", record("last"));

        let err = finalize.finalize().unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.to_string(), "finalize: broken: disk full");
        assert_eq!(*log.lock().unwrap(), vec!["last", "first"]);
    }

    #[test]
    fn test_finalizer_nested_chain() {
        let (log, record) = recorder();
        let mut finalize = Finalizer::new();
        finalize.with("outer", record("outer"));
        let mut nested = finalize.nested();
        nested.with("inner", record("inner"));
        nested.finalize().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["inner"]);

        nested.with("late", record("late"));
        finalize.finalize().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["inner", "late", "outer"]);

        drop(nested);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_finalizer_dismiss_drops_pending() {
        let (log, record) = recorder();
        {
            let mut finalize = Finalizer::new();
            finalize.with("temp", record("temp"));
            finalize.dismiss();
            assert!(finalize.is_empty());
            finalize.with("after", record("after"));
        }
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_finalizer_runs_pending_on_drop() {
        let (log, record) = recorder();
        {
            let mut finalize = Finalizer::new();
            finalize.with("temp", record("temp"));
        }
        assert_eq!(*log.lock().unwrap(), vec!["temp"]);
    }
}
