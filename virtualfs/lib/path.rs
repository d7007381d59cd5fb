use std::path::{Component, Path, PathBuf};

use crate::{PathSegment, VfsError, VfsResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Splits a path into validated segments relative to the root of a virtual filesystem.
///
/// Rules:
/// - A leading `/` and `.` components are ignored
/// - `..` removes the previous segment
/// - Traversal above the root is rejected
///
/// ## Errors
///
/// Returns [`VfsError::InvalidPathComponent`] if the path escapes the root or contains a segment
/// that is not valid UTF-8.
pub fn path_segments(path: &Path) -> VfsResult<Vec<PathSegment>> {
    let mut segments: Vec<PathSegment> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => continue,
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(VfsError::InvalidPathComponent(
                        path.to_string_lossy().into_owned(),
                    ));
                }
            }
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| {
                    VfsError::InvalidPathComponent(name.to_string_lossy().into_owned())
                })?;
                segments.push(PathSegment::try_from(name)?);
            }
        }
    }

    Ok(segments)
}

/// Normalizes a path into its canonical relative form.
///
/// The root of the filesystem is represented by the empty path.
pub fn normalize_path(path: &Path) -> VfsResult<PathBuf> {
    Ok(path_segments(path)?.iter().collect())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("")).unwrap(), PathBuf::new());
        assert_eq!(normalize_path(Path::new("/")).unwrap(), PathBuf::new());
        assert_eq!(
            normalize_path(Path::new("./blobs/../blobs/sha256")).unwrap(),
            PathBuf::from("blobs/sha256")
        );
        assert_eq!(
            normalize_path(Path::new("/test/index.json")).unwrap(),
            PathBuf::from("test/index.json")
        );
    }

    #[test]
    fn test_normalize_path_rejects_escape() {
        assert!(matches!(
            normalize_path(Path::new("../outside")),
            Err(VfsError::InvalidPathComponent(_))
        ));
        assert!(normalize_path(Path::new("a/../../b")).is_err());
    }
}
