use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use virtualfs::VirtualFileSystem;

use crate::{
    accessobj::{
        AccessMode, AccessObjectInfo, DescriptorState, FileStateAccess, State, StateHandler,
    },
    artdesc::Index,
    OcmError, OcmResult, KIND_STRUCTURE_FORMAT,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The descriptor file of artifact sets in the OCM structure format.
pub const ARTIFACTSET_DESCRIPTOR_FILE_NAME: &str = "artifact-descriptor.json";

/// The descriptor file of artifact sets in the OCI structure formats.
pub const OCI_ARTIFACTSET_DESCRIPTOR_FILE_NAME: &str = "index.json";

/// The directory holding the blobs of an artifact set.
pub const BLOBS_DIRECTORY_NAME: &str = "blobs";

/// The marker file of an OCI image layout.
pub const OCI_LAYOUT_FILE_NAME: &str = "oci-layout";

/// The content written to [`OCI_LAYOUT_FILE_NAME`].
pub const OCI_LAYOUT_CONTENT: &str = "{\n    \"imageLayoutVersion\": \"1.0.0\"\n}\n";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The on-disk structure of an artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureFormat {
    /// `index.json`, `oci-layout` and flat blob paths `blobs/<algorithm>.<hex>`.
    Oci,

    /// `index.json`, `oci-layout` and nested blob paths `blobs/<algorithm>/<hex>` as required
    /// by the OCI image layout.
    OciCompliant,

    /// `artifact-descriptor.json` and flat blob paths.
    Ocm,
}

/// The descriptor handler of artifact sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexHandler;

/// The layout of an artifact set.
///
/// The structure format configured at creation is adapted to the markers found when an
/// existing set is opened: `index.json` selects an OCI format, `artifact-descriptor.json` the
/// OCM format and a lone `oci-layout` again an OCI format. An OCI set whose blob directory
/// contains subdirectories uses nested blob paths.
#[derive(Debug, Clone)]
pub struct ArtifactSetInfo {
    format: StructureFormat,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StructureFormat {
    /// Returns the name of the format.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Oci => "oci",
            Self::OciCompliant => "oci-compliant",
            Self::Ocm => "ocm",
        }
    }

    /// Returns `true` for the OCI formats.
    pub const fn is_oci(&self) -> bool {
        matches!(self, Self::Oci | Self::OciCompliant)
    }

    /// Returns the descriptor file name used by the format.
    pub const fn descriptor_file_name(&self) -> &'static str {
        if self.is_oci() {
            OCI_ARTIFACTSET_DESCRIPTOR_FILE_NAME
        } else {
            ARTIFACTSET_DESCRIPTOR_FILE_NAME
        }
    }
}

impl ArtifactSetInfo {
    /// Creates the layout for the given structure format.
    pub fn new(format: StructureFormat) -> Self {
        Self { format }
    }

    /// Returns the structure format in effect.
    pub fn get_format(&self) -> StructureFormat {
        self.format
    }

    fn set_oci(&mut self, fs: &dyn VirtualFileSystem) -> OcmResult<()> {
        if self.format == StructureFormat::Ocm {
            self.format = StructureFormat::Oci;
        }

        if self.format == StructureFormat::Oci && has_nested_blobs(fs)? {
            tracing::debug!("found nested blob directories, using oci-compliant paths");
            self.format = StructureFormat::OciCompliant;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn has_nested_blobs(fs: &dyn VirtualFileSystem) -> OcmResult<bool> {
    let blobs = Path::new(BLOBS_DIRECTORY_NAME);
    if !fs.is_dir(blobs)? {
        return Ok(false);
    }
    Ok(fs.read_directory(blobs)?.iter().any(|e| e.is_dir()))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for StructureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureFormat {
    type Err = OcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oci" => Ok(Self::Oci),
            "oci-compliant" | "ocicompliant" => Ok(Self::OciCompliant),
            "ocm" => Ok(Self::Ocm),
            _ => Err(OcmError::unknown(KIND_STRUCTURE_FORMAT, s)),
        }
    }
}

impl StateHandler for IndexHandler {
    type State = Index;

    fn initial(&self) -> Index {
        Index::new()
    }

    fn encode(&self, state: &Index) -> OcmResult<Vec<u8>> {
        state.encode()
    }

    fn decode(&self, data: &[u8]) -> OcmResult<Index> {
        Index::decode(data)
    }
}

impl AccessObjectInfo for ArtifactSetInfo {
    fn descriptor_file_name(&self) -> &str {
        self.format.descriptor_file_name()
    }

    fn object_type_name(&self) -> &str {
        "artifactset"
    }

    fn element_directory_name(&self) -> &str {
        BLOBS_DIRECTORY_NAME
    }

    fn element_type_name(&self) -> &str {
        "blob"
    }

    fn additional_files(&self, _fs: &dyn VirtualFileSystem) -> Vec<String> {
        if self.format.is_oci() {
            vec![OCI_LAYOUT_FILE_NAME.to_string()]
        } else {
            Vec::new()
        }
    }

    fn setup_for(&mut self, fs: &dyn VirtualFileSystem) -> OcmResult<()> {
        if fs.is_file(Path::new(OCI_ARTIFACTSET_DESCRIPTOR_FILE_NAME))? {
            return self.set_oci(fs);
        }
        if fs.is_file(Path::new(ARTIFACTSET_DESCRIPTOR_FILE_NAME))? {
            self.format = StructureFormat::Ocm;
            return Ok(());
        }
        if fs.is_file(Path::new(OCI_LAYOUT_FILE_NAME))? {
            return self.set_oci(fs);
        }
        Ok(())
    }

    fn setup_file_system(&mut self, fs: &dyn VirtualFileSystem) -> OcmResult<()> {
        self.setup_for(fs)?;
        fs.create_directory_all(Path::new(BLOBS_DIRECTORY_NAME))?;

        let layout = Path::new(OCI_LAYOUT_FILE_NAME);
        if self.format.is_oci() && !fs.exists(layout)? {
            fs.write_file(layout, OCI_LAYOUT_CONTENT.as_bytes())?;
        }
        Ok(())
    }

    fn setup_descriptor_state(
        &self,
        mode: AccessMode,
        fs: Arc<dyn VirtualFileSystem>,
    ) -> OcmResult<Box<dyn DescriptorState>> {
        let access = FileStateAccess::new(fs, self.descriptor_file_name());
        Ok(Box::new(State::new(mode, Arc::new(access), IndexHandler)?))
    }

    fn sub_path(&self, name: &str) -> PathBuf {
        let blobs = Path::new(BLOBS_DIRECTORY_NAME);
        match name.split_once('.') {
            Some((algorithm, hex)) if self.format == StructureFormat::OciCompliant => {
                blobs.join(algorithm).join(hex)
            }
            _ => blobs.join(name),
        }
    }

    fn validate_descriptor(&self, data: &[u8]) -> OcmResult<()> {
        Index::decode(data).map(|_| ())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use virtualfs::MemoryFileSystem;

    use super::*;

    #[test]
    fn test_structure_format_parse() -> anyhow::Result<()> {
        assert_eq!("oci".parse::<StructureFormat>()?, StructureFormat::Oci);
        assert_eq!(
            "ociCompliant".parse::<StructureFormat>()?,
            StructureFormat::OciCompliant
        );
        assert_eq!("OCM".parse::<StructureFormat>()?, StructureFormat::Ocm);
        assert!("zip".parse::<StructureFormat>().is_err());
        assert_eq!(StructureFormat::OciCompliant.to_string(), "oci-compliant");
        Ok(())
    }

    #[test]
    fn test_sub_path() {
        let flat = ArtifactSetInfo::new(StructureFormat::Oci);
        assert_eq!(flat.sub_path("sha256.abc"), PathBuf::from("blobs/sha256.abc"));

        let nested = ArtifactSetInfo::new(StructureFormat::OciCompliant);
        assert_eq!(nested.sub_path("sha256.abc"), PathBuf::from("blobs/sha256/abc"));
        assert_eq!(nested.sub_path("plain"), PathBuf::from("blobs/plain"));
    }

    #[test_log::test]
    fn test_setup_file_system() -> anyhow::Result<()> {
        let fs = MemoryFileSystem::new();
        let mut info = ArtifactSetInfo::new(StructureFormat::Oci);
        info.setup_file_system(&fs)?;

        assert!(fs.is_dir(Path::new("blobs"))?);
        assert_eq!(
            fs.read_file(Path::new(OCI_LAYOUT_FILE_NAME))?,
            OCI_LAYOUT_CONTENT.as_bytes()
        );
        assert_eq!(info.additional_files(&fs), vec![OCI_LAYOUT_FILE_NAME]);

        let fs = MemoryFileSystem::new();
        let mut info = ArtifactSetInfo::new(StructureFormat::Ocm);
        info.setup_file_system(&fs)?;
        assert!(!fs.exists(Path::new(OCI_LAYOUT_FILE_NAME))?);
        assert_eq!(info.descriptor_file_name(), ARTIFACTSET_DESCRIPTOR_FILE_NAME);
        Ok(())
    }

    #[test]
    fn test_setup_for_detects_conventions() -> anyhow::Result<()> {
        let fs = MemoryFileSystem::new();
        fs.write_file(Path::new(ARTIFACTSET_DESCRIPTOR_FILE_NAME), b"{}")?;
        let mut info = ArtifactSetInfo::new(StructureFormat::Oci);
        info.setup_for(&fs)?;
        assert_eq!(info.get_format(), StructureFormat::Ocm);

        let fs = MemoryFileSystem::new();
        fs.write_file(Path::new(OCI_LAYOUT_FILE_NAME), b"{}")?;
        fs.create_directory_all(Path::new("blobs/sha256"))?;
        let mut info = ArtifactSetInfo::new(StructureFormat::Ocm);
        info.setup_for(&fs)?;
        assert_eq!(info.get_format(), StructureFormat::OciCompliant);

        let fs = MemoryFileSystem::new();
        let mut info = ArtifactSetInfo::new(StructureFormat::Ocm);
        info.setup_for(&fs)?;
        assert_eq!(info.get_format(), StructureFormat::Ocm);
        Ok(())
    }
}
