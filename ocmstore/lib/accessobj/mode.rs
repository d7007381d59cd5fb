use std::{
    fmt,
    ops::{BitAnd, BitOr},
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The mode an access object is opened with.
///
/// Modes are bit flags and can be combined with `|`, e.g. `AccessMode::READONLY | AccessMode::CREATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMode(u8);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AccessMode {
    /// Open an existing object for reading and writing.
    pub const WRITABLE: AccessMode = AccessMode(0);

    /// Open for reading only. Every mutation fails.
    pub const READONLY: AccessMode = AccessMode(1);

    /// Create the object if it does not exist.
    pub const CREATE: AccessMode = AccessMode(2);

    /// Returns `true` if the read-only flag is set.
    pub fn is_read_only(self) -> bool {
        self.0 & Self::READONLY.0 != 0
    }

    /// Returns `true` if the create flag is set.
    pub fn is_create(self) -> bool {
        self.0 & Self::CREATE.0 != 0
    }

    /// Returns `true` if all flags of `other` are set.
    pub fn contains(self, other: AccessMode) -> bool {
        self.0 & other.0 == other.0
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl BitOr for AccessMode {
    type Output = AccessMode;

    fn bitor(self, rhs: AccessMode) -> AccessMode {
        AccessMode(self.0 | rhs.0)
    }
}

impl BitAnd for AccessMode {
    type Output = AccessMode;

    fn bitand(self, rhs: AccessMode) -> AccessMode {
        AccessMode(self.0 & rhs.0)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = if self.is_read_only() { "readonly" } else { "writable" };
        if self.is_create() {
            write!(f, "{access}|create")
        } else {
            write!(f, "{access}")
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
