use std::{
    any::Any,
    fmt::Debug,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use virtualfs::VirtualFileSystem;

use crate::{OcmError, OcmResult, KIND_FILE};

use super::AccessMode;

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Describes how a descriptor type is created, serialized and compared.
pub trait StateHandler: Debug + Clone + Send + Sync + 'static {
    /// The in-memory descriptor.
    type State: Debug + Clone + Send + Sync + 'static;

    /// Returns the descriptor of a newly created object.
    fn initial(&self) -> Self::State;

    /// Serializes a descriptor.
    fn encode(&self, state: &Self::State) -> OcmResult<Vec<u8>>;

    /// Deserializes a descriptor.
    fn decode(&self, data: &[u8]) -> OcmResult<Self::State>;

    /// Returns `true` if both descriptors would be persisted identically.
    ///
    /// The default compares the encoded forms.
    fn equivalent(&self, a: &Self::State, b: &Self::State) -> bool {
        match (self.encode(a), self.encode(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// Where the serialized descriptor lives.
pub trait StateAccess: Debug + Send + Sync {
    /// Reads the serialized descriptor. Returns `None` if none has been stored yet.
    fn get(&self) -> OcmResult<Option<Bytes>>;

    /// Stores the serialized descriptor.
    fn put(&self, data: &[u8]) -> OcmResult<()>;

    /// Returns a human readable location used in error messages.
    fn location(&self) -> String;
}

/// The type-erased view on a [`State`] held by an access object.
pub trait DescriptorState: Debug + Send + Sync {
    /// Returns `true` if the state rejects updates.
    fn is_read_only(&self) -> bool;

    /// Returns `true` if the current descriptor differs from the persisted one.
    fn has_changed(&self) -> bool;

    /// Persists the current descriptor if it changed. Returns whether anything was written.
    fn update(&mut self) -> OcmResult<bool>;

    /// Returns the serialized form of the current descriptor.
    fn get_blob(&self) -> OcmResult<Bytes>;

    /// Returns the state as [`Any`] for downcasting to the typed [`State`].
    fn as_any(&self) -> &dyn Any;

    /// Returns the state as mutable [`Any`] for downcasting to the typed [`State`].
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The descriptor of an access object.
///
/// A state keeps the descriptor as last persisted next to the one being modified. Only
/// [`State::update`] writes to the underlying [`StateAccess`].
#[derive(Debug)]
pub struct State<H: StateHandler> {
    mode: AccessMode,
    access: Arc<dyn StateAccess>,
    handler: H,
    original_blob: Option<Bytes>,
    original: Option<H::State>,
    current: H::State,
}

/// A descriptor stored in a file of a virtual filesystem.
#[derive(Debug)]
pub struct FileStateAccess {
    fs: Arc<dyn VirtualFileSystem>,
    path: PathBuf,
}

/// A descriptor held in memory.
#[derive(Debug, Default)]
pub struct BlobStateAccess {
    data: Mutex<Option<Bytes>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<H: StateHandler> State<H> {
    /// Loads the state from `access`.
    ///
    /// ## Errors
    ///
    /// Fails with a not found error if nothing is stored and `mode` does not include
    /// [`AccessMode::CREATE`], or if the stored descriptor cannot be decoded.
    pub fn new(mode: AccessMode, access: Arc<dyn StateAccess>, handler: H) -> OcmResult<Self> {
        let (original_blob, original, current) = match access.get()? {
            Some(data) => {
                let current = handler.decode(&data)?;
                (Some(data), Some(current.clone()), current)
            }
            None if mode.is_create() => (None, None, handler.initial()),
            None => return Err(OcmError::not_found(KIND_FILE, access.location())),
        };

        Ok(Self {
            mode,
            access,
            handler,
            original_blob,
            original,
            current,
        })
    }

    /// Returns the handler of this state.
    pub fn get_handler(&self) -> &H {
        &self.handler
    }

    /// Returns the descriptor as last persisted, if any.
    pub fn get_original_state(&self) -> Option<&H::State> {
        self.original.as_ref()
    }

    /// Returns the descriptor as last persisted, or the initial one for new objects.
    pub fn get_original_or_initial(&self) -> H::State {
        self.original
            .clone()
            .unwrap_or_else(|| self.handler.initial())
    }

    /// Returns the current descriptor.
    pub fn get_state(&self) -> &H::State {
        &self.current
    }

    /// Returns the current descriptor for modification.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::ReadOnly`] for read-only states.
    pub fn get_state_mut(&mut self) -> OcmResult<&mut H::State> {
        if self.mode.is_read_only() {
            return Err(OcmError::ReadOnly);
        }
        Ok(&mut self.current)
    }

    /// Returns the serialized descriptor as last persisted.
    pub fn get_original_blob(&self) -> Option<&Bytes> {
        self.original_blob.as_ref()
    }

    /// Reloads the state from its access, dropping all pending modifications.
    pub fn refresh(&mut self) -> OcmResult<()> {
        *self = State::new(self.mode, Arc::clone(&self.access), self.handler.clone())?;
        Ok(())
    }
}

impl FileStateAccess {
    /// Creates access to the descriptor stored at `path` in `fs`.
    pub fn new(fs: Arc<dyn VirtualFileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }
}

impl BlobStateAccess {
    /// Creates access to an in-memory descriptor, optionally with initial content.
    pub fn new(data: Option<Bytes>) -> Self {
        Self {
            data: Mutex::new(data),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<H: StateHandler> DescriptorState for State<H> {
    fn is_read_only(&self) -> bool {
        self.mode.is_read_only()
    }

    fn has_changed(&self) -> bool {
        match &self.original {
            Some(original) => !self.handler.equivalent(original, &self.current),
            None => true,
        }
    }

    fn update(&mut self) -> OcmResult<bool> {
        if !self.has_changed() {
            return Ok(false);
        }

        if self.mode.is_read_only() {
            return Err(OcmError::ReadOnly);
        }

        let data = self.handler.encode(&self.current)?;
        let original = self.handler.decode(&data)?;
        self.access.put(&data)?;
        self.original_blob = Some(Bytes::from(data));
        self.original = Some(original);
        Ok(true)
    }

    fn get_blob(&self) -> OcmResult<Bytes> {
        match &self.original_blob {
            Some(blob) if !self.has_changed() => Ok(blob.clone()),
            _ => Ok(Bytes::from(self.handler.encode(&self.current)?)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl StateAccess for FileStateAccess {
    fn get(&self) -> OcmResult<Option<Bytes>> {
        if !self.fs.exists(&self.path)? {
            return Ok(None);
        }
        Ok(Some(Bytes::from(self.fs.read_file(&self.path)?)))
    }

    fn put(&self, data: &[u8]) -> OcmResult<()> {
        self.fs.write_file(&self.path, data).map_err(|e| {
            OcmError::from(e).with_context(format!(
                "unable to write file \"{}\"",
                self.path.display()
            ))
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

impl StateAccess for BlobStateAccess {
    fn get(&self) -> OcmResult<Option<Bytes>> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn put(&self, data: &[u8]) -> OcmResult<()> {
        *self.data.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Bytes::copy_from_slice(data));
        Ok(())
    }

    fn location(&self) -> String {
        "in-memory descriptor".to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use virtualfs::MemoryFileSystem;

    use super::*;

    #[derive(Debug, Clone)]
    struct Lines;

    impl StateHandler for Lines {
        type State = Vec<String>;

        fn initial(&self) -> Vec<String> {
            Vec::new()
        }

        fn encode(&self, state: &Vec<String>) -> OcmResult<Vec<u8>> {
            Ok(state.join("\n").into_bytes())
        }

        fn decode(&self, data: &[u8]) -> OcmResult<Vec<String>> {
            let text = String::from_utf8_lossy(data);
            Ok(text
                .split('\n')
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect())
        }
    }

    #[test]
    fn test_state_missing_descriptor() {
        let err = State::new(AccessMode::WRITABLE, Arc::new(BlobStateAccess::default()), Lines)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_state_update_writes_only_changes() -> anyhow::Result<()> {
        let fs = Arc::new(MemoryFileSystem::new());
        let access = Arc::new(FileStateAccess::new(fs.clone(), "descriptor"));
        let mut state = State::new(AccessMode::CREATE, access, Lines)?;

        assert!(state.has_changed());
        assert!(state.update()?);
        assert_eq!(fs.read_file(Path::new("descriptor"))?, b"");
        assert!(!state.update()?);

        state.get_state_mut()?.push("first".to_string());
        assert!(state.has_changed());
        assert_eq!(state.get_blob()?, Bytes::from_static(b"first"));
        assert!(state.update()?);
        assert_eq!(fs.read_file(Path::new("descriptor"))?, b"first");
        assert_eq!(state.get_original_state(), Some(&vec!["first".to_string()]));
        Ok(())
    }

    #[test]
    fn test_state_read_only() -> anyhow::Result<()> {
        let access = Arc::new(BlobStateAccess::new(Some(Bytes::from_static(b"a\nb"))));
        let mut state = State::new(AccessMode::READONLY, access.clone(), Lines)?;

        assert_eq!(state.get_state(), &vec!["a".to_string(), "b".to_string()]);
        assert!(!state.update()?);
        assert!(state.get_state_mut().unwrap_err().is_read_only());
        assert_eq!(access.get()?, Some(Bytes::from_static(b"a\nb")));
        Ok(())
    }

    #[test]
    fn test_state_refresh_drops_changes() -> anyhow::Result<()> {
        let access = Arc::new(BlobStateAccess::new(Some(Bytes::from_static(b"kept"))));
        let mut state = State::new(AccessMode::WRITABLE, access, Lines)?;

        state.get_state_mut()?.push("dropped".to_string());
        state.refresh()?;
        assert_eq!(state.get_state(), &vec!["kept".to_string()]);
        assert!(!state.has_changed());
        Ok(())
    }
}
