use tracing::trace;

use crate::storage::{
    NodeTree,
    tree::ROOT_PATH,
    types::{FileType, Node},
};

/// A path with `.`, `..` and redundant separators resolved, always absolute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalPath {
    pub path: String,
    // The caller's spelling ended with a separator, so it can only name a directory.
    pub dir_marked: bool,
}

impl CanonicalPath {
    pub fn new(raw: &str) -> Self {
        let mut parts: Vec<&str> = Vec::new();

        for part in raw.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                part => parts.push(part),
            }
        }

        let path = if parts.is_empty() {
            ROOT_PATH.to_string()
        } else {
            format!("/{}", parts.join("/"))
        };
        let dir_marked = path != ROOT_PATH && (raw.ends_with('/') || raw.ends_with("/."));

        Self { path, dir_marked }
    }

    pub fn is_root(&self) -> bool {
        self.path == ROOT_PATH
    }

    // Canonical path of the containing directory, None for the root.
    pub fn parent(&self) -> Option<&str> {
        parent_of(&self.path)
    }

    pub fn file_name(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) if !self.is_root() => &self.path[i + 1..],
            _ => ROOT_PATH,
        }
    }
}

/// How a path relates to the current state of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The path names an existing node.
    Found(Node),
    /// The parent directory exists and the path itself does not.
    Creatable { parent: Node },
    /// The path does not exist and ends with a separator.
    DirMarked,
    /// An ancestor exists but is a regular file, or a separator-terminated
    /// path names a regular file.
    ParentIsFile,
    /// Neither the path nor its parent directory exist.
    Missing,
}

// Classify `path` against the tree, nothing is modified.
pub fn resolve(tree: &NodeTree, path: &CanonicalPath) -> Resolution {
    let resolution = classify(tree, path);
    trace!(path = %path.path, ?resolution, "path resolved");
    resolution
}

fn classify(tree: &NodeTree, path: &CanonicalPath) -> Resolution {
    if let Some(node) = tree.lookup(&path.path) {
        let is_file = tree
            .get(node)
            .is_some_and(|n| n.file_type == FileType::RegularFile);

        // "file/" asks for a directory that is not there
        if is_file && path.dir_marked {
            return Resolution::ParentIsFile;
        }
        return Resolution::Found(node);
    }

    // the closest existing ancestor decides between missing and not-a-directory
    let mut ancestor = path.parent();
    let mut immediate = true;

    while let Some(dir) = ancestor {
        if let Some(node) = tree.lookup(dir) {
            let is_dir = tree
                .get(node)
                .is_some_and(|n| n.file_type == FileType::Directory);

            return match (is_dir, immediate) {
                (false, _) => Resolution::ParentIsFile,
                (true, _) if path.dir_marked => Resolution::DirMarked,
                (true, true) => Resolution::Creatable { parent: node },
                (true, false) => Resolution::Missing,
            };
        }

        immediate = false;
        ancestor = parent_of(dir);
    }

    Resolution::Missing
}

fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT_PATH),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}
