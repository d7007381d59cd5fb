use std::{path::Path, sync::Arc};

use virtualfs::{copy_file, copy_tree, ProjectionFileSystem, VirtualFileSystem};

use crate::{OcmError, OcmResult, KIND_FILE};

use super::{AccessMode, AccessObject, AccessObjectInfo, AccessOptions, FileFormat, FormatHandler};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stores access objects as plain directory trees.
///
/// The object works directly on the directory, there is nothing to persist on close apart from
/// the descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryFormat;

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FormatHandler for DirectoryFormat {
    fn format(&self) -> FileFormat {
        FileFormat::Directory
    }

    fn open(
        &self,
        info: Box<dyn AccessObjectInfo>,
        mode: AccessMode,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        let fs = ProjectionFileSystem::new(Arc::clone(options.get_path_fs()), path).map_err(|e| {
            OcmError::from(e).with_context(format!(
                "unable to open {} from {}",
                info.object_type_name(),
                path.display()
            ))
        })?;

        tracing::info!("opening {} directory {}", info.object_type_name(), path.display());
        AccessObject::new(info, mode, Some(Arc::new(fs)), None, None)
    }

    fn create(
        &self,
        info: Box<dyn AccessObjectInfo>,
        path: &Path,
        options: &AccessOptions,
    ) -> OcmResult<AccessObject> {
        let path_fs = options.get_path_fs();
        if path_fs.exists(path)? {
            return Err(OcmError::AlreadyExists {
                kind: KIND_FILE,
                name: path.display().to_string(),
            });
        }

        path_fs.create_directory_all(path)?;
        let fs = ProjectionFileSystem::new(Arc::clone(path_fs), path)?;

        tracing::info!("creating {} directory {}", info.object_type_name(), path.display());
        AccessObject::new(info, AccessMode::CREATE, Some(Arc::new(fs)), None, None)
    }

    fn write(&self, obj: &mut AccessObject, path: &Path, options: &AccessOptions) -> OcmResult<()> {
        obj.update()?;

        let src = Arc::clone(obj.get_file_system()?);
        let info = obj.get_info();
        let dst = options.get_path_fs();

        dst.create_directory_all(path)?;
        let descriptor = obj.get_state().get_blob()?;
        dst.write_file(&path.join(info.descriptor_file_name()), &descriptor)
            .map_err(|e| OcmError::from(e).with_context("unable to write descriptor"))?;

        for name in info.additional_files(src.as_ref()) {
            let file = Path::new(&name);
            if src.is_file(file)? {
                copy_file(src.as_ref(), file, dst.as_ref(), &path.join(file))?;
            }
        }

        let elements = Path::new(info.element_directory_name());
        if src.is_dir(elements)? {
            copy_tree(src.as_ref(), elements, dst.as_ref(), &path.join(elements)).map_err(|e| {
                OcmError::from(e).with_context(format!(
                    "unable to copy {} directory",
                    info.element_type_name()
                ))
            })?;
        } else {
            dst.create_directory_all(&path.join(elements))?;
        }

        tracing::info!("wrote {} directory {}", info.object_type_name(), path.display());
        Ok(())
    }
}
