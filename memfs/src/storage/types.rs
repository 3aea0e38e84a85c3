use serde::{Deserialize, Serialize};

// The unique identifier of a node, which can be a file or a directory.
// Identifiers are handed out once and never reused within a tree.
pub type Node = u64;

// An integer type for representing file sizes.
pub type FileSize = u64;

// The type of a node.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    Directory,
    #[default]
    RegularFile,
}

// The time stats of a node, nanoseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    pub created: u64,
    pub modified: u64,
}

/// A snapshot of a node's attributes, as returned by `stat` and handed to walk visitors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Canonical absolute path of the node.
    pub path: String,
    /// Base name; the root is named `/`.
    pub name: String,
    pub file_type: FileType,
    /// Permission bits.
    pub mode: u32,
    pub size: FileSize,
    pub times: Times,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::RegularFile
    }

    pub fn len(&self) -> FileSize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn modified(&self) -> u64 {
        self.times.modified
    }
}
