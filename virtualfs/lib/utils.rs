use std::{
    io::{self, Write},
    path::Path,
};

use crate::{VfsResult, VirtualFileSystem};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Recursively copies the directory `src_path` of `src` to `dst_path` in `dst`.
///
/// Missing target directories are created, existing files are overwritten.
pub fn copy_tree(
    src: &dyn VirtualFileSystem,
    src_path: &Path,
    dst: &dyn VirtualFileSystem,
    dst_path: &Path,
) -> VfsResult<()> {
    dst.create_directory_all(dst_path)?;
    for entry in src.read_directory(src_path)? {
        let from = src_path.join(entry.get_name());
        let to = dst_path.join(entry.get_name());
        if entry.is_dir() {
            copy_tree(src, &from, dst, &to)?;
        } else {
            copy_file(src, &from, dst, &to)?;
        }
    }
    Ok(())
}

/// Copies a single file between two filesystems.
pub fn copy_file(
    src: &dyn VirtualFileSystem,
    src_path: &Path,
    dst: &dyn VirtualFileSystem,
    dst_path: &Path,
) -> VfsResult<u64> {
    let mut reader = src.open_file(src_path)?;
    let mut writer = dst.create_file(dst_path)?;
    let size = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    Ok(size)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
