use std::{fmt, str::FromStr};

use crate::{
    compression::{CompressionAlgorithm, GZIP},
    OcmError, KIND_FILEFORMAT,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The physical representation of an access object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileFormat {
    /// A plain directory tree.
    Directory,

    /// An uncompressed tar archive.
    Tar,

    /// A gzip compressed tar archive.
    Tgz,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FileFormat {
    /// All known formats.
    pub const ALL: [FileFormat; 3] = [FileFormat::Directory, FileFormat::Tar, FileFormat::Tgz];

    /// Returns the canonical name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Directory => "directory",
            FileFormat::Tar => "tar",
            FileFormat::Tgz => "tgz",
        }
    }

    /// Returns the conventional file name suffix of the format.
    pub fn suffix(&self) -> &'static str {
        match self {
            FileFormat::Directory => "",
            FileFormat::Tar => ".tar",
            FileFormat::Tgz => ".tgz",
        }
    }

    /// Returns the compression applied to archives of this format.
    pub fn compression(&self) -> Option<&'static dyn CompressionAlgorithm> {
        match self {
            FileFormat::Tgz => Some(&GZIP),
            FileFormat::Directory | FileFormat::Tar => None,
        }
    }

    /// Returns `true` for formats stored as a single archive file.
    pub fn is_archive(&self) -> bool {
        !matches!(self, FileFormat::Directory)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = OcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(FileFormat::Directory),
            "tar" => Ok(FileFormat::Tar),
            "tgz" | "tar.gz" => Ok(FileFormat::Tgz),
            _ => Err(OcmError::unknown(KIND_FILEFORMAT, s)),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_parse_and_display() -> anyhow::Result<()> {
        for format in FileFormat::ALL {
            assert_eq!(format.to_string().parse::<FileFormat>()?, format);
        }
        assert_eq!("tar.gz".parse::<FileFormat>()?, FileFormat::Tgz);

        let err = "zip".parse::<FileFormat>().unwrap_err();
        assert_eq!(err.to_string(), "unknown file format \"zip\"");
        Ok(())
    }

    #[test]
    fn test_file_format_properties() {
        assert!(FileFormat::Tgz.compression().is_some());
        assert!(FileFormat::Tar.compression().is_none());
        assert!(!FileFormat::Directory.is_archive());
        assert_eq!(FileFormat::Tgz.suffix(), ".tgz");
    }
}
