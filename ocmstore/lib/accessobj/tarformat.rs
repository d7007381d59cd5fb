use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use ocmutils::{ErrorList, Finalizer};
use tar::Builder;
use virtualfs::{DirEntry, VirtualFileSystem};

use crate::{compression::compressor_for, OcmError, OcmResult, KIND_FILE};

use super::{
    append_directory, append_file, extract_archive, AccessMode, AccessObject, AccessObjectInfo,
    AccessOptions, Closer, FileFormat, FormatHandler,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stores access objects as tar archives, optionally compressed.
///
/// Archives are extracted into a representation filesystem on open and rewritten from it on
/// close.
#[derive(Debug, Clone, Copy)]
pub struct TarFormat {
    format: FileFormat,
}

/// Rewrites the archive an object was loaded from when the object is closed.
#[derive(Debug)]
struct ArchiveCloser {
    handler: TarFormat,
    path: PathBuf,
    options: AccessOptions,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TarFormat {
    /// The handler for uncompressed tar archives.
    pub const fn tar() -> Self {
        Self {
            format: FileFormat::Tar,
        }
    }

    /// The handler for gzip compressed tar archives.
    pub const fn tgz() -> Self {
        Self {
            format: FileFormat::Tgz,
        }
    }

    fn closer_for(&self, path: &Path, options: &AccessOptions) -> Box<dyn Closer> {
        Box::new(ArchiveCloser {
            handler: *self,
            path: path.to_path_buf(),
            options: options.with_file_format(self.format),
        })
    }

    fn write_entries<W: Write>(
        &self,
        builder: &mut Builder<W>,
        obj: &AccessObject,
        fs: &dyn VirtualFileSystem,
    ) -> OcmResult<()> {
        let info = obj.get_info();

        let descriptor = obj.get_state().get_blob()?;
        append_file(
            builder,
            Path::new(info.descriptor_file_name()),
            descriptor.len() as u64,
            &descriptor[..],
        )
        .map_err(|e| OcmError::from(e).with_context("unable to write descriptor"))?;

        for name in info.additional_files(fs) {
            let path = Path::new(&name);
            if fs.is_file(path)? {
                append_fs_file(builder, fs, path)?;
            }
        }

        let elements = Path::new(info.element_directory_name());
        append_directory(builder, elements).map_err(|e| {
            OcmError::from(e).with_context(format!(
                "unable to write {} directory",
                info.element_type_name()
            ))
        })?;

        let entries = match fs.read_directory(elements) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if entries.iter().any(DirEntry::is_dir) {
            tracing::debug!("writing nested {} layout", info.element_type_name());
            for entry in &entries {
                let path = elements.join(entry.get_name());
                if entry.is_dir() {
                    append_nested_directory(builder, fs, &path)?;
                } else {
                    append_fs_file(builder, fs, &path)?;
                }
            }
        } else {
            for entry in &entries {
                append_fs_file(builder, fs, &info.sub_path(entry.get_name()))?;
            }
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn append_fs_file<W: Write>(
    builder: &mut Builder<W>,
    fs: &dyn VirtualFileSystem,
    path: &Path,
) -> OcmResult<()> {
    let size = fs.get_metadata(path)?.get_size();
    let content = fs.open_file(path)?;
    append_file(builder, path, size, content).map_err(|e| {
        OcmError::from(e).with_context(format!("unable to write {}", path.display()))
    })
}

fn append_nested_directory<W: Write>(
    builder: &mut Builder<W>,
    fs: &dyn VirtualFileSystem,
    path: &Path,
) -> OcmResult<()> {
    append_directory(builder, path).map_err(|e| {
        OcmError::from(e).with_context(format!("unable to write {}", path.display()))
    })?;

    for entry in fs.read_directory(path)? {
        if entry.is_dir() {
            tracing::warn!(
                "skipping nested directory {}",
                path.join(entry.get_name()).display()
            );
            continue;
        }
        append_fs_file(builder, fs, &path.join(entry.get_name()))?;
    }
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FormatHandler for TarFormat {
    fn format(&self) -> FileFormat {
        self.format
    }

    fn open(
        &self,
        info: Box<dyn AccessObjectInfo>,
        mode: AccessMode,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        let reader = options.get_path_fs().open_file(path).map_err(|e| {
            OcmError::from(e).with_context(format!(
                "unable to open {} from {}",
                info.object_type_name(),
                path.display()
            ))
        })?;

        // Read-only objects are never written back.
        let closer = (!mode.is_read_only()).then(|| self.closer_for(path, options));

        tracing::info!(
            "opening {} {} archive {}",
            info.object_type_name(),
            self.format,
            path.display()
        );
        self.new_from_reader(info, mode, reader, options, closer)
    }

    fn create(
        &self,
        info: Box<dyn AccessObjectInfo>,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        if options.get_path_fs().exists(path)? {
            return Err(OcmError::AlreadyExists {
                kind: KIND_FILE,
                name: path.display().to_string(),
            });
        }

        tracing::info!(
            "creating {} {} archive {}",
            info.object_type_name(),
            self.format,
            path.display()
        );
        AccessObject::new(
            info,
            AccessMode::CREATE,
            options.get_representation().clone(),
            None,
            Some(self.closer_for(path, options)),
        )
    }

    fn write(&self, obj: &mut AccessObject, path: &Path, options: &AccessOptions) -> OcmResult<()> {
        obj.update()?;
        let fs = Arc::clone(obj.get_file_system()?);

        let file = options.get_path_fs().create_file(path).map_err(|e| {
            OcmError::from(e).with_context(format!("unable to write {}", path.display()))
        })?;
        let mut builder = Builder::new(compressor_for(self.format.compression(), file));

        let mut finalize = Finalizer::new();
        let path_fs = Arc::clone(options.get_path_fs());
        let target = path.to_path_buf();
        finalize.with("incomplete archive", move || Ok(path_fs.remove(&target)?));

        let mut errors = ErrorList::new(format!(
            "unable to write {} archive {}",
            self.format,
            path.display()
        ));
        errors.add(self.write_entries(&mut builder, obj, fs.as_ref()));
        match builder.into_inner() {
            Ok(compressor) => {
                errors.add(compressor.finish().map_err(OcmError::from));
            }
            Err(e) => errors.push(e.into()),
        }
        if let Err(e) = errors.into_result() {
            if let Err(fe) = finalize.finalize() {
                tracing::warn!("{}", fe);
            }
            return Err(e.into());
        }
        finalize.dismiss();

        tracing::info!(
            "wrote {} {} archive {}",
            obj.get_info().object_type_name(),
            self.format,
            path.display()
        );
        Ok(())
    }

    fn new_from_reader(
        &self,
        info: Box<dyn AccessObjectInfo>,
        mode: AccessMode,
        reader: Box<dyn Read + Send>,
        options: &AccessOptions,
        closer: Option<Box<dyn Closer>>,
    ) -> OcmResult<AccessObject> {
        let reader = match self.format.compression() {
            Some(algorithm) => algorithm.decompressor(reader),
            None => reader,
        };

        AccessObject::new(
            info,
            mode,
            options.get_representation().clone(),
            Some(Box::new(move |fs: &dyn VirtualFileSystem| {
                extract_archive(reader, fs)
                    .map_err(|e| e.with_context("unable to extract archive"))
            })),
            closer,
        )
    }
}

impl Closer for ArchiveCloser {
    fn close(self: Box<Self>, obj: &mut AccessObject) -> OcmResult<()> {
        self.handler.write(obj, &self.path, &self.options)
    }
}
