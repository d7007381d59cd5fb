mod memoryfs;
mod nativefs;
mod projectionfs;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use memoryfs::*;
pub use nativefs::*;
pub use projectionfs::*;
