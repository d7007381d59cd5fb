//! Artifact sets.
//!
//! An [`ArtifactSet`] stores OCI manifests and indexes together with the blobs they refer to.
//! Its [`StructureFormat`] decides between the OCM layout (`artifact-descriptor.json`, flat
//! blob paths) and the OCI image layout (`index.json`, `oci-layout`, optionally nested blob
//! paths).

mod format;
mod set;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use format::*;
pub use set::*;
