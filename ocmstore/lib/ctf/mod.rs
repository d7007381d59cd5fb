//! Common transport format archives.
//!
//! A [`Repository`] stores the artifacts of any number of namespaces in one access object.
//! The artifacts are recorded in `artifact-index.json` and their blobs are kept in a flat
//! `blobs` directory shared by all namespaces.

mod index;
mod namespace;
mod repository;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use index::*;
pub use namespace::*;
pub use repository::*;
