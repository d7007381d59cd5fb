use crate::artifactset::StructureFormat;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The permission mode of directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// The permission mode of regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// The mode recorded in tar headers of regular files.
pub const DEFAULT_ARCHIVE_FILE_MODE: u32 = DEFAULT_FILE_MODE;

/// The mode recorded in tar headers of directories.
pub const DEFAULT_ARCHIVE_DIR_MODE: u32 = DEFAULT_DIR_MODE;

/// The modification time recorded in tar headers.
///
/// It is fixed so that writing the same content twice yields byte-identical archives.
pub const DEFAULT_ARCHIVE_MOD_TIME: u64 = 0;

/// The structure format used for new artifact sets.
pub const DEFAULT_STRUCTURE_FORMAT: StructureFormat = StructureFormat::Oci;
