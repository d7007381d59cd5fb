use std::{
    io::{self, Read, Write},
    path::{Component, Path, PathBuf},
};

use tar::{Builder, EntryType, Header};
use virtualfs::VirtualFileSystem;

use crate::{
    config::{DEFAULT_ARCHIVE_DIR_MODE, DEFAULT_ARCHIVE_FILE_MODE, DEFAULT_ARCHIVE_MOD_TIME},
    OcmError, OcmResult, KIND_FILE,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Extracts a tar stream into `fs`.
///
/// Regular files and directories are extracted, other entry types are skipped.
///
/// ## Errors
///
/// Fails for entries with absolute paths or paths leaving the root via `..`.
pub fn extract_archive(reader: impl Read, fs: &dyn VirtualFileSystem) -> OcmResult<()> {
    let mut archive = tar::Archive::new(reader);
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry_path(&entry.path()?)?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            if !path.as_os_str().is_empty() {
                fs.create_directory_all(&path)?;
            }
        } else if entry_type.is_file() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs.create_directory_all(parent)?;
            }
            let mut writer = fs.create_file(&path)?;
            io::copy(&mut entry, &mut writer)?;
            writer.flush()?;
            count += 1;
        } else {
            tracing::warn!(
                "skipping unsupported tar entry {} ({:?})",
                path.display(),
                entry_type
            );
        }
    }

    tracing::debug!("extracted {} files from archive", count);
    Ok(())
}

/// Normalizes the path of a tar entry.
///
/// Leading `./` components are removed.
///
/// ## Errors
///
/// Fails for absolute paths and paths containing `..`.
pub fn entry_path(path: &Path) -> OcmResult<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(OcmError::invalid(
                    KIND_FILE,
                    format!("unsafe archive entry path {}", path.display()),
                ))
            }
        }
    }
    Ok(normalized)
}

/// Appends a regular file entry with the default mode and modification time.
pub fn append_file<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    size: u64,
    content: impl Read,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(size);
    header.set_mode(DEFAULT_ARCHIVE_FILE_MODE);
    header.set_mtime(DEFAULT_ARCHIVE_MOD_TIME);
    builder.append_data(&mut header, path, content.take(size))
}

/// Appends a directory entry with the default mode and modification time.
pub fn append_directory<W: Write>(builder: &mut Builder<W>, path: &Path) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(DEFAULT_ARCHIVE_DIR_MODE);
    header.set_mtime(DEFAULT_ARCHIVE_MOD_TIME);
    builder.append_data(&mut header, path, io::empty())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use virtualfs::MemoryFileSystem;

    use super::*;

    fn archive(entries: &[(&str, Option<&str>)]) -> anyhow::Result<Vec<u8>> {
        let mut builder = Builder::new(Vec::new());
        for (name, content) in entries {
            match content {
                Some(data) => {
                    append_file(&mut builder, Path::new(name), data.len() as u64, data.as_bytes())?
                }
                None => append_directory(&mut builder, Path::new(name))?,
            }
        }
        Ok(builder.into_inner()?)
    }

    #[test_log::test]
    fn test_extract_archive() -> anyhow::Result<()> {
        let data = archive(&[
            ("index.json", Some("{}")),
            ("blobs", None),
            ("blobs/sha256", None),
            ("blobs/sha256/abc", Some("content")),
            ("./nested/file", Some("x")),
        ])?;

        let fs = MemoryFileSystem::new();
        extract_archive(&data[..], &fs)?;

        assert_eq!(fs.read_file(Path::new("index.json"))?, b"{}");
        assert!(fs.is_dir(Path::new("blobs/sha256"))?);
        assert_eq!(fs.read_file(Path::new("blobs/sha256/abc"))?, b"content");
        assert_eq!(fs.read_file(Path::new("nested/file"))?, b"x");
        Ok(())
    }

    #[test]
    fn test_entry_path_rejects_escapes() -> anyhow::Result<()> {
        assert_eq!(entry_path(Path::new("./blobs/a"))?, PathBuf::from("blobs/a"));
        assert!(entry_path(Path::new("../evil")).is_err());
        assert!(entry_path(Path::new("/etc/passwd")).is_err());
        Ok(())
    }

    #[test]
    fn test_headers_are_deterministic() -> anyhow::Result<()> {
        let first = archive(&[("blobs", None), ("blobs/a", Some("a"))])?;
        let second = archive(&[("blobs", None), ("blobs/a", Some("a"))])?;
        assert_eq!(first, second);

        let mut reader = tar::Archive::new(&first[..]);
        for entry in reader.entries()? {
            let entry = entry?;
            assert_eq!(entry.header().mtime()?, 0);
        }
        Ok(())
    }
}
