use bitflags::bitflags;

// file descriptor
pub type Fd = u32;

bitflags! {
    /// Open flags, bit compatible with the Linux `O_*` constants.
    /// Read-only access is the absence of both access bits.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Open for writing only.
        const WRITE_ONLY = 0o1;
        /// Open for reading and writing.
        const READ_WRITE = 0o2;
        /// Create file if it does not exist.
        const CREATE = 0o100;
        /// Together with CREATE, fail if file already exists.
        const EXCLUSIVE = 0o200;
        /// Truncate file to size 0.
        const TRUNCATE = 0o1000;
        /// Every write goes to the end of the file.
        const APPEND = 0o2000;
    }
}

const ACCESS_MODE_MASK: u32 = 0o3;

impl OpenFlags {
    pub const READ_ONLY: Self = Self::empty();

    pub fn can_read(self) -> bool {
        self.bits() & ACCESS_MODE_MASK != Self::WRITE_ONLY.bits()
    }

    pub fn can_write(self) -> bool {
        self.bits() & ACCESS_MODE_MASK != Self::READ_ONLY.bits()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    // relative to the origin of the file
    SET,
    // relative to the current offset
    CUR,
    // relative to the end of the file
    END,
}

/// What a walk visitor wants to happen next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visit {
    #[default]
    Continue,
    /// Do not descend into the directory just visited.
    SkipDir,
    /// Stop the whole walk, the walk still reports success.
    SkipAll,
}
