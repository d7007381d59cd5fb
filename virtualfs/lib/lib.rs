//! `virtualfs` is a library for synchronous virtual file systems.
//!
//! The crate provides the [`VirtualFileSystem`] trait together with three implementations:
//!
//! - [`MemoryFileSystem`] keeps the whole tree in memory.
//! - [`NativeFileSystem`] maps paths onto a directory of the host filesystem, optionally a
//!   temporary one that is removed again by [`VirtualFileSystem::cleanup`].
//! - [`ProjectionFileSystem`] exposes a sub-tree of another filesystem as its own root.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

mod error;
mod filesystem;
mod implementations;
mod metadata;
mod path;
mod segment;
mod utils;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use error::*;
pub use filesystem::*;
pub use implementations::*;
pub use metadata::*;
pub use path::*;
pub use segment::*;
pub use utils::*;
