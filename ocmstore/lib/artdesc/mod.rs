//! Index and artifact descriptor types.
//!
//! An [`Index`] lists the artifacts of an artifact set as [`Descriptor`]s. OCM metadata that
//! OCI has no field for, like the tags of an artifact or the main artifact of a set, is kept
//! in annotations.

mod artifact;
mod index;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Index annotation naming the main artifact of a set.
pub const MAINARTIFACT_ANNOTATION: &str = "software.ocm/main";

/// Descriptor annotation holding the comma separated tags of an artifact.
pub const TAGS_ANNOTATION: &str = "software.ocm/tags";

/// Descriptor annotation holding the type of an artifact.
pub const TYPE_ANNOTATION: &str = "software.ocm/type";

/// Former name of [`MAINARTIFACT_ANNOTATION`], still read.
pub const LEGACY_MAINARTIFACT_ANNOTATION: &str = "cloud.gardener.ocm/main";

/// Former name of [`TAGS_ANNOTATION`], still read.
pub const LEGACY_TAGS_ANNOTATION: &str = "cloud.gardener.ocm/tags";

/// Former name of [`TYPE_ANNOTATION`], still read.
pub const LEGACY_TYPE_ANNOTATION: &str = "cloud.gardener.ocm/type";

/// Descriptor annotation holding the single tag of an OCI index entry.
pub const OCITAG_ANNOTATION: &str = "org.opencontainers.image.ref.name";

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use artifact::*;
pub use index::*;
