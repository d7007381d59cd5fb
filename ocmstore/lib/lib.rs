//! `ocmstore` is the storage engine behind OCM artifact sets and common transport format archives.
//!
//! # Overview
//!
//! An [`accessobj::AccessObject`] owns a virtual filesystem holding one descriptor file and a
//! directory of content-addressed blobs. Format handlers serialize that tree as a plain
//! directory, a tar archive or a gzip compressed tar archive. Two on-disk conventions are
//! supported:
//!
//! - The OCM convention: `artifact-descriptor.json` and flat blob paths `blobs/sha256.<hex>`.
//! - The OCI convention: `index.json`, an `oci-layout` marker file and, in its compliant
//!   flavor, nested blob paths `blobs/sha256/<hex>`.
//!
//! On top of that this crate provides:
//!
//! - [`artifactset::ArtifactSet`] - an index of OCI manifests with tags and a main artifact
//! - [`ctf::Repository`] - a common transport format archive holding many namespaces
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use ocmstore::{
//!     accessobj::{AccessMode, AccessOptions, FileFormat},
//!     artdesc::Artifact,
//!     artifactset::{ArtifactSet, ArtifactSetOptions},
//!     blob::{BlobData, MIME_JSON, MIME_OCTET},
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let options = ArtifactSetOptions::builder()
//!         .access(AccessOptions::builder().file_format(FileFormat::Tgz).build())
//!         .build();
//!     let set = ArtifactSet::open(AccessMode::CREATE, "set.tgz", &options)?;
//!
//!     let config = BlobData::for_string(MIME_JSON, "{}")?;
//!     let layer = BlobData::for_string(MIME_OCTET, "testdata")?;
//!     set.add_blob(&config)?;
//!     set.add_blob(&layer)?;
//!     set.add_artifact(&Artifact::new_manifest(&config, &[&layer])?, &["v1"])?;
//!
//!     set.close()?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`accessobj`] - Access objects, descriptor state, blob store and format handlers
//! - [`artdesc`] - Index and artifact descriptor types
//! - [`artifactset`] - Artifact sets
//! - [`blob`] - Blob and data access abstractions
//! - [`compression`] - Compression algorithms
//! - [`config`] - Defaults and environment configuration
//! - [`ctf`] - Common transport format repositories
//! - [`digest`] - Digest helpers

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod error;

pub mod accessobj;
pub mod artdesc;
pub mod artifactset;
pub mod blob;
pub mod compression;
pub mod config;
pub mod ctf;
pub mod digest;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use error::*;
