use std::{fmt::Debug, path::Path, sync::Arc};

use ocmutils::{ErrorList, Finalizer};
use virtualfs::{NativeFileSystem, VirtualFileSystem};

use crate::{OcmError, OcmResult, KIND_DESCRIPTOR, KIND_FILEFORMAT};

use super::{
    AccessMode, AccessObjectInfo, AccessOptions, DescriptorState, FormatRegistry, State,
    StateHandler,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Prepares the filesystem of a new access object before its descriptor is loaded.
pub type Setup<'a> = Box<dyn FnOnce(&dyn VirtualFileSystem) -> OcmResult<()> + 'a>;

/// An object represented by a filesystem holding a descriptor file and a directory of elements.
///
/// The filesystem is either provided by the caller or a temporary one owned by the object. Owned
/// filesystems are cleaned up on [`AccessObject::close`].
#[derive(Debug)]
pub struct AccessObject {
    info: Box<dyn AccessObjectInfo>,
    mode: AccessMode,
    fs: Option<Arc<dyn VirtualFileSystem>>,
    cleanup: bool,
    state: Box<dyn DescriptorState>,
    closer: Option<Box<dyn Closer>>,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Persists an access object when it is closed, e.g. by writing its archive.
pub trait Closer: Debug + Send + Sync {
    /// Called once by [`AccessObject::close`] after the descriptor has been updated.
    fn close(self: Box<Self>, obj: &mut AccessObject) -> OcmResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AccessObject {
    /// Creates an access object.
    ///
    /// ## Arguments
    ///
    /// * `info` - The layout of the object
    /// * `mode` - The access mode
    /// * `fs` - The filesystem representation, a temporary one is allocated if `None`
    /// * `setup` - Fills the filesystem before the descriptor is loaded
    /// * `closer` - Persists the object on close
    ///
    /// ## Errors
    ///
    /// Fails if the filesystem cannot be prepared or the descriptor cannot be loaded. A
    /// temporary filesystem allocated here is cleaned up in that case.
    pub fn new(
        mut info: Box<dyn AccessObjectInfo>,
        mode: AccessMode,
        fs: Option<Arc<dyn VirtualFileSystem>>,
        setup: Option<Setup<'_>>,
        closer: Option<Box<dyn Closer>>,
    ) -> OcmResult<Self> {
        let mut finalize = Finalizer::new();
        let (fs, cleanup) = match fs {
            Some(fs) => (fs, false),
            None => {
                let fs: Arc<dyn VirtualFileSystem> = Arc::new(NativeFileSystem::temporary()?);
                let temporary = Arc::clone(&fs);
                finalize.with("temporary filesystem", move || Ok(temporary.cleanup()?));
                (fs, true)
            }
        };

        let state = match prepare(info.as_mut(), mode, &fs, setup) {
            Ok(state) => state,
            Err(e) => {
                if let Err(ce) = finalize.finalize() {
                    tracing::warn!("failed to clean up temporary filesystem: {}", ce);
                }
                return Err(e);
            }
        };
        finalize.dismiss();

        tracing::debug!(
            "opened {} ({}) with {} filesystem",
            info.object_type_name(),
            mode,
            if cleanup { "temporary" } else { "provided" }
        );

        Ok(Self {
            info,
            mode,
            fs: Some(fs),
            cleanup,
            state,
            closer,
        })
    }

    /// Returns the layout of the object.
    pub fn get_info(&self) -> &dyn AccessObjectInfo {
        self.info.as_ref()
    }

    /// Returns the access mode.
    pub fn get_mode(&self) -> AccessMode {
        self.mode
    }

    /// Returns the filesystem representation.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::Closed`] once the object is closed.
    pub fn get_file_system(&self) -> OcmResult<&Arc<dyn VirtualFileSystem>> {
        self.fs.as_ref().ok_or(OcmError::Closed)
    }

    /// Returns the type-erased descriptor state.
    pub fn get_state(&self) -> &dyn DescriptorState {
        self.state.as_ref()
    }

    /// Returns the typed descriptor state.
    ///
    /// ## Errors
    ///
    /// Fails if the object is closed or its descriptor is not handled by `H`.
    pub fn state<H: StateHandler>(&self) -> OcmResult<&State<H>> {
        self.check_open()?;
        self.state
            .as_any()
            .downcast_ref::<State<H>>()
            .ok_or_else(|| self.state_mismatch())
    }

    /// Returns the typed descriptor state for modification.
    ///
    /// ## Errors
    ///
    /// Fails if the object is closed, opened read-only or its descriptor is not handled by `H`.
    pub fn state_mut<H: StateHandler>(&mut self) -> OcmResult<&mut State<H>> {
        self.check_writable()?;
        let err = self.state_mismatch();
        self.state
            .as_any_mut()
            .downcast_mut::<State<H>>()
            .ok_or(err)
    }

    /// Returns `true` once the object has been closed.
    pub fn is_closed(&self) -> bool {
        self.fs.is_none()
    }

    /// Returns `true` if the object rejects mutations.
    pub fn is_read_only(&self) -> bool {
        self.state.is_read_only()
    }

    /// Fails with [`OcmError::Closed`] if the object is closed.
    pub fn check_open(&self) -> OcmResult<()> {
        if self.is_closed() {
            return Err(OcmError::Closed);
        }
        Ok(())
    }

    /// Fails with [`OcmError::Closed`] or [`OcmError::ReadOnly`] if the object cannot be mutated.
    pub fn check_writable(&self) -> OcmResult<()> {
        self.check_open()?;
        if self.is_read_only() {
            return Err(OcmError::ReadOnly);
        }
        Ok(())
    }

    /// Persists the descriptor if it changed. Returns whether anything was written.
    pub fn update(&mut self) -> OcmResult<bool> {
        self.check_open()
            .and_then(|_| self.state.update())
            .map_err(|e| e.with_context("unable to update descriptor"))
    }

    /// Writes the object to `path` of the options' path filesystem in the options' file format.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::Closed`] on closed objects and with an unknown file format error
    /// if no handler is registered for the format.
    pub fn write(&mut self, path: &Path, options: &AccessOptions) -> OcmResult<()> {
        self.check_open()?;
        let format = options
            .get_file_format()
            .ok_or_else(|| OcmError::unknown(KIND_FILEFORMAT, "<unset>"))?;
        let handler = FormatRegistry::global()
            .get(format)
            .ok_or_else(|| OcmError::unknown(KIND_FILEFORMAT, format.as_str()))?;
        handler.write(self, path, options)
    }

    /// Closes the object.
    ///
    /// The descriptor is updated, the closer runs and an owned filesystem is cleaned up. All
    /// steps run even if an earlier one failed, the failures are reported together.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::Closed`] if the object is already closed.
    pub fn close(&mut self) -> OcmResult<()> {
        self.check_open()?;

        let mut errors = ErrorList::new(format!("cannot close {}", self.info.object_type_name()));
        errors.add(self.update());
        if let Some(closer) = self.closer.take() {
            errors.add(closer.close(self));
        }
        if let Some(fs) = self.fs.take() {
            if self.cleanup {
                errors.add(fs.cleanup().map_err(OcmError::from));
            }
        }

        tracing::debug!("closed {}", self.info.object_type_name());
        errors.into_result().map_err(OcmError::List)
    }

    fn state_mismatch(&self) -> OcmError {
        OcmError::invalid(
            KIND_DESCRIPTOR,
            format!(
                "unexpected descriptor type for {}",
                self.info.object_type_name()
            ),
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn prepare(
    info: &mut dyn AccessObjectInfo,
    mode: AccessMode,
    fs: &Arc<dyn VirtualFileSystem>,
    setup: Option<Setup<'_>>,
) -> OcmResult<Box<dyn DescriptorState>> {
    if let Some(setup) = setup {
        setup(fs.as_ref())?;
    }
    if !mode.is_read_only() {
        info.setup_file_system(fs.as_ref())?;
    }
    info.setup_for(fs.as_ref())?;
    info.setup_descriptor_state(mode, Arc::clone(fs))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for AccessObject {
    fn drop(&mut self) {
        if let Some(fs) = self.fs.take() {
            tracing::warn!(
                "{} dropped without being closed, pending changes are lost",
                self.info.object_type_name()
            );
            if self.cleanup {
                if let Err(e) = fs.cleanup() {
                    tracing::warn!("failed to clean up temporary filesystem: {}", e);
                }
            }
        }
    }
}
