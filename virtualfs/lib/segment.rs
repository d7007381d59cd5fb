use std::{
    fmt::{self, Display},
    path::{Component, Path},
    str::FromStr,
};

use crate::VfsError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Represents a single, validated segment of a path.
///
/// A segment is never empty and never contains a separator, `.` or `..`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment(String);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PathSegment {
    /// Returns the string representation of the segment.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the length of the segment in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the segment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for PathSegment {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathSegment::try_from(s)
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for PathSegment {
    type Error = VfsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(VfsError::EmptyPathSegment);
        }

        if value.contains('/') || value.contains('\\') {
            return Err(VfsError::InvalidPathComponent(value.to_string()));
        }

        let mut components = Path::new(value).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(PathSegment(value.to_string())),
            _ => Err(VfsError::InvalidPathComponent(value.to_string())),
        }
    }
}

impl AsRef<str> for PathSegment {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for PathSegment {
    #[inline]
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
