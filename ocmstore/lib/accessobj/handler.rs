use std::{
    collections::HashMap,
    fmt::Debug,
    io::Read,
    path::Path,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

use virtualfs::VirtualFileSystem;

use crate::{compression::auto_decompress, OcmError, OcmResult, KIND_FILE, KIND_FILEFORMAT};

use super::{
    entry_path, AccessMode, AccessObject, AccessObjectInfo, AccessOptions, Closer,
    DirectoryFormat, FileFormat, TarFormat,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

static GLOBAL_REGISTRY: LazyLock<FormatRegistry> = LazyLock::new(FormatRegistry::with_defaults);

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Loads and persists access objects in one [`FileFormat`].
pub trait FormatHandler: Debug + Send + Sync {
    /// Returns the format handled.
    fn format(&self) -> FileFormat;

    /// Opens the object stored at `path` of the options' path filesystem.
    fn open(
        &self,
        info: Box<dyn AccessObjectInfo>,
        mode: AccessMode,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject>;

    /// Creates a new object that is stored at `path` when closed.
    ///
    /// ## Errors
    ///
    /// Fails with [`OcmError::AlreadyExists`] if `path` exists.
    fn create(
        &self,
        info: Box<dyn AccessObjectInfo>,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject>;

    /// Writes `obj` to `path` of the options' path filesystem.
    fn write(&self, obj: &mut AccessObject, path: &Path, options: &AccessOptions)
        -> OcmResult<()>;

    /// Loads an object from a serialized stream.
    ///
    /// Only archive formats support this.
    fn new_from_reader(
        &self,
        _info: Box<dyn AccessObjectInfo>,
        _mode: AccessMode,
        _reader: Box<dyn Read + Send>,
        _options: &AccessOptions,
        _closer: Option<Box<dyn Closer>>,
    ) -> OcmResult<AccessObject> {
        Err(OcmError::invalid(
            KIND_FILEFORMAT,
            format!("{} cannot be read from a stream", self.format()),
        ))
    }
}

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A thread-safe registry of format handlers.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    handlers: RwLock<HashMap<FileFormat, Arc<dyn FormatHandler>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the directory, tar and tgz handlers.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(DirectoryFormat));
        registry.register(Arc::new(TarFormat::tar()));
        registry.register(Arc::new(TarFormat::tgz()));
        registry
    }

    /// Returns the process wide registry, initialized with the standard handlers on first use.
    pub fn global() -> &'static FormatRegistry {
        &GLOBAL_REGISTRY
    }

    /// Registers a handler, replacing any handler for the same format.
    pub fn register(&self, handler: Arc<dyn FormatHandler>) {
        let format = handler.format();
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(format, handler);
        tracing::trace!("registered {} format handler", format);
    }

    /// Returns the handler for `format`.
    pub fn get(&self, format: FileFormat) -> Option<Arc<dyn FormatHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&format)
            .cloned()
    }

    /// Returns the registered formats sorted by name.
    pub fn supported_formats(&self) -> Vec<FileFormat> {
        let mut formats: Vec<FileFormat> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        formats.sort_by_key(|f| f.as_str());
        formats
    }

    /// Opens the object at `path`, or creates it if it is missing and `mode` allows creation.
    ///
    /// See [`handle_access_mode`] for how the format is chosen.
    pub fn open_or_create(
        &self,
        info: Box<dyn AccessObjectInfo>,
        mode: AccessMode,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        let (options, create) = handle_access_mode(mode, path, options)?;
        let handler = self.lookup(&options)?;
        if create {
            handler.create(info, path, &options)
        } else {
            handler.open(info, mode, path, &options)
        }
    }

    /// Creates a new object at `path` in the configured format, `directory` if none is set.
    pub fn create(
        &self,
        info: Box<dyn AccessObjectInfo>,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        let options = options.with_default_file_format(FileFormat::Directory);
        self.lookup(&options)?.create(info, path, &options)
    }

    /// Opens an archive read-only from serialized data.
    ///
    /// Media types ending with `+gzip` are read as `tgz`, all others as `tar`.
    pub fn open_from_data(
        &self,
        info: Box<dyn AccessObjectInfo>,
        mime_type: &str,
        reader: Box<dyn Read + Send>,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        let format = if mime_type.ends_with("+gzip") {
            FileFormat::Tgz
        } else {
            FileFormat::Tar
        };
        let options = options.with_file_format(format);
        self.lookup(&options)?
            .new_from_reader(info, AccessMode::READONLY, reader, &options, None)
    }

    fn lookup(&self, options: &AccessOptions) -> OcmResult<Arc<dyn FormatHandler>> {
        let format = options
            .get_file_format()
            .ok_or_else(|| OcmError::unknown(KIND_FILEFORMAT, "<unset>"))?;
        self.get(format)
            .ok_or_else(|| OcmError::unknown(KIND_FILEFORMAT, format.as_str()))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Decides whether `path` is opened or created and fixes the format to use.
///
/// An existing path is opened with the configured format, or the detected one if none is set.
/// A missing path is created if `mode` includes [`AccessMode::CREATE`], with the configured
/// format or `directory`.
///
/// ## Returns
///
/// The options with the format set and whether the object has to be created.
///
/// ## Errors
///
/// Fails with a not found error for a missing path without [`AccessMode::CREATE`].
pub fn handle_access_mode(
    mode: AccessMode,
    path: &Path,
    options: &AccessOptions,
) -> OcmResult<(AccessOptions, bool)> {
    let fs = options.get_path_fs();
    if fs.exists(path)? {
        let format = match options.get_file_format() {
            Some(format) => format,
            None => detect_format(path, fs.as_ref())?,
        };
        return Ok((options.with_file_format(format), false));
    }

    if mode.is_create() {
        return Ok((options.with_default_file_format(FileFormat::Directory), true));
    }

    Err(OcmError::not_found(KIND_FILE, path.display().to_string()))
}

/// Detects the format of the object stored at `path`.
///
/// ## Errors
///
/// Fails if `path` is neither a directory nor a (gzip compressed) tar archive.
pub fn detect_format(path: &Path, fs: &dyn VirtualFileSystem) -> OcmResult<FileFormat> {
    if fs.is_dir(path)? {
        return Ok(FileFormat::Directory);
    }

    let (compressed, reader) = auto_decompress(fs.open_file(path)?)?;
    let mut archive = tar::Archive::new(reader);
    let first = archive.entries()?.next();
    match first {
        Some(Ok(_)) if compressed => Ok(FileFormat::Tgz),
        Some(Ok(_)) => Ok(FileFormat::Tar),
        Some(Err(e)) => Err(OcmError::invalid(
            KIND_FILEFORMAT,
            format!("{}: {}", path.display(), e),
        )),
        None => Err(OcmError::invalid(
            KIND_FILEFORMAT,
            format!("{}: empty archive", path.display()),
        )),
    }
}

/// Validates the descriptor of the object at `path` without opening it.
///
/// For directories only the descriptor file is read. Archives are scanned entry by entry until
/// the descriptor is found.
///
/// ## Errors
///
/// Fails with [`OcmError::NoDescriptorFound`] if an archive has no descriptor entry.
pub fn validate_descriptor(
    info: &dyn AccessObjectInfo,
    path: &Path,
    fs: &dyn VirtualFileSystem,
) -> OcmResult<()> {
    if !fs.exists(path)? {
        return Err(OcmError::not_found(KIND_FILE, path.display().to_string()));
    }

    if fs.is_dir(path)? {
        let data = fs.read_file(&path.join(info.descriptor_file_name()))?;
        return info.validate_descriptor(&data);
    }

    let (_, reader) = auto_decompress(fs.open_file(path)?)?;
    let mut archive = tar::Archive::new(reader);
    let descriptor = Path::new(info.descriptor_file_name());
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() && entry_path(&entry.path()?)? == descriptor {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return info.validate_descriptor(&data);
        }
    }

    Err(OcmError::NoDescriptorFound {
        file: info.descriptor_file_name().to_string(),
        path: path.display().to_string(),
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
