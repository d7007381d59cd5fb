//! `ocmutils` is a library containing general utilities for the ocmstore project.
//!
//! - [`ErrorList`] aggregates independent failures into a single error value.
//! - [`retry`] re-runs operations failing with errors tagged as [`Retriable`].
//! - [`Finalizer`] runs registered cleanup actions in reverse registration order.
//! - [`View`] multiplexes logical open/close pairs onto a single physical close.

#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod errlist;
pub mod error;
pub mod finalizer;
pub mod refmgmt;
pub mod retry;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use errlist::*;
pub use error::*;
pub use finalizer::*;
pub use refmgmt::*;
pub use retry::*;
