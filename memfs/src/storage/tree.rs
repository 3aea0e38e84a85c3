use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    error::ErrorKind,
    storage::types::{FileSize, FileType, Metadata, Node, Times},
};

// The root node ID.
pub const ROOT_NODE: Node = 0;

pub const ROOT_PATH: &str = "/";

// A single file or directory held by the tree.
#[derive(Debug)]
pub struct NodeData {
    pub file_type: FileType,
    pub path: String,
    pub name: String,
    pub content: Vec<u8>,
    pub mode: u32,
    pub times: Times,
    pub parent: Option<Node>,
    // Keyed by the child's canonical path, present for directories only.
    pub children: Option<BTreeMap<String, Node>>,
    // False once the node was removed from the indices but is still held open.
    linked: bool,
}

impl NodeData {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            path: self.path.clone(),
            name: self.name.clone(),
            file_type: self.file_type,
            mode: self.mode,
            size: self.content.len() as FileSize,
            times: self.times,
        }
    }
}

/// Arena of nodes addressed by stable identifiers, plus the flat path index.
///
/// The index and the parent/children links are only ever changed together by
/// [`NodeTree::insert`] and [`NodeTree::unlink`], so they cannot diverge.
#[derive(Debug)]
pub struct NodeTree {
    nodes: BTreeMap<Node, NodeData>,
    index: BTreeMap<String, Node>,
    next_node: Node,
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

// Zero-extend `content` to at least `len` bytes.
// The allocation is reserved up front, so an unsatisfiable size is an error instead of an abort.
fn grow(content: &mut Vec<u8>, len: usize) -> Result<(), ErrorKind> {
    if content.len() < len {
        content
            .try_reserve_exact(len - content.len())
            .map_err(|_| ErrorKind::FileTooLarge)?;
        content.resize(len, 0);
    }
    Ok(())
}

impl NodeTree {
    // Initializes a tree holding only the root directory.
    pub fn new(root_mode: u32, now: u64) -> Self {
        let root = NodeData {
            file_type: FileType::Directory,
            path: ROOT_PATH.to_string(),
            name: ROOT_PATH.to_string(),
            content: Vec::new(),
            mode: root_mode,
            times: Times {
                created: now,
                modified: now,
            },
            parent: None,
            children: Some(BTreeMap::new()),
            linked: true,
        };

        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT_NODE, root);
        let mut index = BTreeMap::new();
        index.insert(ROOT_PATH.to_string(), ROOT_NODE);

        Self {
            nodes,
            index,
            next_node: ROOT_NODE + 1,
        }
    }

    pub fn root_node(&self) -> Node {
        ROOT_NODE
    }

    // Find a node by its canonical path.
    pub fn lookup(&self, path: &str) -> Option<Node> {
        self.index.get(path).copied()
    }

    pub fn get(&self, node: Node) -> Option<&NodeData> {
        self.nodes.get(&node)
    }

    pub fn get_mut(&mut self, node: Node) -> Option<&mut NodeData> {
        self.nodes.get_mut(&node)
    }

    pub fn metadata(&self, node: Node) -> Result<Metadata, ErrorKind> {
        self.get(node)
            .map(NodeData::metadata)
            .ok_or(ErrorKind::NotFound)
    }

    // Number of reachable nodes, the root included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_linked(&self, node: Node) -> bool {
        self.get(node).is_some_and(|n| n.linked)
    }

    // Immediate children of a directory ordered by canonical path.
    pub fn children(&self, node: Node) -> Vec<Node> {
        self.get(node)
            .and_then(|n| n.children.as_ref())
            .map(|c| c.values().copied().collect())
            .unwrap_or_default()
    }

    // Add a new node named `name` under the directory `parent`.
    pub fn insert(
        &mut self,
        parent: Node,
        name: &str,
        file_type: FileType,
        mode: u32,
        content: Vec<u8>,
        now: u64,
    ) -> Result<Node, ErrorKind> {
        let parent_data = self.get(parent).ok_or(ErrorKind::NotFound)?;
        if !parent_data.is_dir() {
            return Err(ErrorKind::NotADirectory);
        }

        let path = join_path(&parent_data.path, name);
        if self.index.contains_key(&path) {
            return Err(ErrorKind::AlreadyExists);
        }

        let node = self.next_node;
        self.next_node += 1;

        let children = match file_type {
            FileType::Directory => Some(BTreeMap::new()),
            FileType::RegularFile => None,
        };

        self.nodes.insert(
            node,
            NodeData {
                file_type,
                path: path.clone(),
                name: name.to_string(),
                content,
                mode,
                times: Times {
                    created: now,
                    modified: now,
                },
                parent: Some(parent),
                children,
                linked: true,
            },
        );

        if let Some(children) = self.get_mut(parent).and_then(|p| p.children.as_mut()) {
            children.insert(path.clone(), node);
        }
        self.index.insert(path.clone(), node);

        debug!(node, path = %path, ?file_type, "node inserted");

        Ok(node)
    }

    // Detach a node from its parent and from the path index.
    // The node data stays in the arena until `purge` is called.
    pub fn unlink(&mut self, node: Node) -> Result<(), ErrorKind> {
        let data = self.get(node).ok_or(ErrorKind::NotFound)?;
        if !data.linked {
            return Err(ErrorKind::NotFound);
        }
        let Some(parent) = data.parent else {
            return Err(ErrorKind::PermissionDenied);
        };
        if data.has_children() {
            return Err(ErrorKind::NotEmpty);
        }

        let path = data.path.clone();

        if let Some(children) = self.get_mut(parent).and_then(|p| p.children.as_mut()) {
            children.remove(&path);
        }
        self.index.remove(&path);
        if let Some(data) = self.get_mut(node) {
            data.linked = false;
        }

        debug!(node, path = %path, "node unlinked");

        Ok(())
    }

    // Release the storage of an unlinked node.
    pub fn purge(&mut self, node: Node) {
        if !self.is_linked(node) && self.nodes.remove(&node).is_some() {
            debug!(node, "node purged");
        }
    }

    // Replace the whole content of a file.
    pub fn set_content(&mut self, node: Node, content: Vec<u8>, now: u64) -> Result<(), ErrorKind> {
        let data = self.file_mut(node)?;
        data.content = content;
        data.times.modified = now;
        Ok(())
    }

    // Resize the content of a file, new bytes are zero.
    pub fn resize(&mut self, node: Node, size: FileSize, now: u64) -> Result<(), ErrorKind> {
        let size = usize::try_from(size).map_err(|_| ErrorKind::FileTooLarge)?;
        let data = self.file_mut(node)?;
        grow(&mut data.content, size)?;
        data.content.truncate(size);
        data.times.modified = now;
        Ok(())
    }

    // Copy file bytes starting at `offset` into `buf`, returns the number of bytes copied.
    pub fn read_at(&self, node: Node, offset: FileSize, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        let data = self.get(node).ok_or(ErrorKind::NotFound)?;
        let len = data.content.len() as FileSize;
        if offset >= len {
            return Ok(0);
        }

        let src = &data.content[offset as usize..];
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        Ok(n)
    }

    // Overlay `buf` at `offset`, zero-filling any gap past the current end.
    // The modification time is left untouched.
    pub fn write_at(&mut self, node: Node, offset: FileSize, buf: &[u8]) -> Result<usize, ErrorKind> {
        let offset = usize::try_from(offset).map_err(|_| ErrorKind::FileTooLarge)?;
        let end = offset
            .checked_add(buf.len())
            .ok_or(ErrorKind::FileTooLarge)?;

        let data = self.file_mut(node)?;
        grow(&mut data.content, end)?;
        data.content[offset..end].copy_from_slice(buf);

        Ok(buf.len())
    }

    fn file_mut(&mut self, node: Node) -> Result<&mut NodeData, ErrorKind> {
        let data = self.get_mut(node).ok_or(ErrorKind::NotFound)?;
        if data.is_dir() {
            return Err(ErrorKind::IsADirectory);
        }
        Ok(data)
    }

    // Verify that the path index and the parent/children links describe the same tree.
    #[cfg(test)]
    pub(crate) fn check_consistency(&self) {
        for (path, node) in self.index.iter() {
            let data = self.get(*node).expect("indexed node missing from arena");
            assert_eq!(&data.path, path);
            assert!(data.linked);
            assert_eq!(data.children.is_some(), data.is_dir());

            match data.parent {
                None => assert_eq!(*node, ROOT_NODE),
                Some(parent) => {
                    let parent_data = self.get(parent).expect("parent missing");
                    assert_eq!(join_path(&parent_data.path, &data.name), *path);
                    let siblings = parent_data.children.as_ref().expect("parent is a file");
                    assert_eq!(siblings.get(path), Some(node));
                }
            }

            for (child_path, child) in data.children.iter().flatten() {
                assert_eq!(self.index.get(child_path), Some(child));
            }
        }
    }
}
