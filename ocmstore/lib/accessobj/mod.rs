//! Access objects and their filesystem formats.
//!
//! An [`AccessObject`] owns a filesystem representation holding a descriptor file and a
//! directory of elements. Its descriptor is managed as a [`State`]. [`FormatHandler`]s load
//! and persist the representation as a directory, a tar archive or a gzip compressed tar
//! archive.

mod blobaccess;
mod dirformat;
mod format;
mod handler;
mod info;
mod mode;
mod object;
mod options;
mod state;
mod tarformat;
mod tarutils;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use blobaccess::*;
pub use dirformat::*;
pub use format::*;
pub use handler::*;
pub use info::*;
pub use mode::*;
pub use object::*;
pub use options::*;
pub use state::*;
pub use tarformat::*;
pub use tarutils::*;
