use std::{collections::VecDeque, fmt};

use tracing::debug;

use crate::{
    builder::MemFsBuilder,
    clock::{Clock, SystemClock},
    config::{FsConfig, TruncateGrowth},
    error::{Error, ErrorKind},
    runtime::{
        fd::{Descriptor, FdTable},
        path::{CanonicalPath, Resolution, resolve},
        walk::walk_nodes,
    },
    storage::{
        NodeTree,
        tree::NodeData,
        types::{FileType, Node},
    },
};

pub use crate::runtime::types::{Fd, OpenFlags, Visit, Whence};
pub use crate::storage::types::{FileSize, Metadata, Times};

/// Visitor of [`FileSystem::walk_dir`].
///
/// Receives the canonical path, the node's metadata and the error found for
/// that path. The error is only ever set, with no metadata, when the walk root
/// itself could not be resolved.
pub type WalkFn<'a> =
    dyn FnMut(&str, Option<&Metadata>, Option<Error>) -> Result<Visit, Error> + 'a;

/// The operations shared by the in-memory engine and the host pass-through.
pub trait FileSystem {
    // Create or truncate a file and open it for reading and writing.
    fn create(&mut self, path: &str) -> Result<Fd, Error>;
    // Open an existing file or directory read-only.
    fn open(&mut self, path: &str) -> Result<Fd, Error>;
    // Open with explicit flags, `mode` is used only when the file gets created.
    fn open_file(&mut self, path: &str, flags: OpenFlags, mode: u32) -> Result<Fd, Error>;
    fn stat(&self, path: &str) -> Result<Metadata, Error>;
    fn walk_dir(&self, root: &str, visitor: &mut WalkFn<'_>) -> Result<(), Error>;
    fn truncate(&mut self, path: &str, size: i64) -> Result<(), Error>;
    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error>;
    fn write_file(&mut self, path: &str, data: &[u8], mode: u32) -> Result<(), Error>;
    fn remove(&mut self, path: &str) -> Result<(), Error>;
    fn remove_all(&mut self, path: &str) -> Result<(), Error>;

    // Read at the descriptor's cursor, `Ok(0)` marks the end of the file.
    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, Error>;
    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, Error>;
    fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<i64, Error>;
    fn metadata(&self, fd: Fd) -> Result<Metadata, Error>;
    fn close(&mut self, fd: Fd) -> Result<(), Error>;
}

/// An in-memory file system with POSIX-like semantics.
///
/// All state lives in this value: the node tree, the descriptor table, the
/// configuration and the clock used to stamp modification times. There is no
/// internal locking, callers sharing an instance must serialize access.
pub struct MemFs {
    tree: NodeTree,
    fd_table: FdTable,
    config: FsConfig,
    clock: Box<dyn Clock>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new(FsConfig::default(), Box::new(SystemClock))
    }
}

impl MemFs {
    // Create a file system holding only the root directory.
    pub fn new(config: FsConfig, clock: Box<dyn Clock>) -> Self {
        let tree = NodeTree::new(config.default_dir_mode(), clock.now());

        Self {
            tree,
            fd_table: FdTable::new(),
            config,
            clock,
        }
    }

    pub fn builder() -> MemFsBuilder {
        MemFsBuilder::default()
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    // Get the path of the root folder.
    pub fn root_path(&self) -> &str {
        "/"
    }

    // Get the current descriptor cursor position.
    pub fn tell(&self, fd: Fd) -> Result<i64, Error> {
        Ok(self.descriptor("seek", fd)?.tell())
    }

    pub(crate) fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now()
    }

    // Resolve a path that must name an existing node.
    fn find(&self, op: &'static str, raw: &str) -> Result<Node, Error> {
        match resolve(&self.tree, &CanonicalPath::new(raw)) {
            Resolution::Found(node) => Ok(node),
            Resolution::ParentIsFile => Err(Error::new(op, raw, ErrorKind::NotADirectory)),
            Resolution::Creatable { .. } | Resolution::DirMarked | Resolution::Missing => {
                Err(Error::new(op, raw, ErrorKind::NotFound))
            }
        }
    }

    fn is_dir(&self, node: Node) -> bool {
        self.tree.get(node).is_some_and(|n| n.is_dir())
    }

    // Descriptors that are not open have no path left, errors report the number instead.
    fn descriptor(&self, op: &'static str, fd: Fd) -> Result<&Descriptor, Error> {
        self.fd_table
            .get(fd)
            .map_err(|kind| Error::new(op, fd.to_string(), kind))
    }

    fn open_descriptor(&mut self, node: Node, flags: OpenFlags) -> Fd {
        let path = self
            .tree
            .get(node)
            .map(|n| n.path.clone())
            .unwrap_or_default();
        self.fd_table.open(Descriptor::new(node, path, flags))
    }

    // Free the storage of a node that is neither in the tree nor held open.
    fn release(&mut self, node: Node) {
        if self.fd_table.refcount(node) == 0 {
            self.tree.purge(node);
        }
    }

    // Create a new file or truncate an existing one, then open it with `flags`.
    fn create_file(&mut self, raw: &str, flags: OpenFlags, mode: u32) -> Result<Fd, Error> {
        let path = CanonicalPath::new(raw);
        let fail = |kind| Error::new("open", raw, kind);

        let node = match resolve(&self.tree, &path) {
            Resolution::Found(node) => {
                if self.is_dir(node) {
                    return Err(fail(ErrorKind::IsADirectory));
                }
                let now = self.now();
                self.tree.set_content(node, Vec::new(), now).map_err(fail)?;
                debug!(path = %path.path, "existing file truncated on create");
                node
            }
            Resolution::Creatable { parent } => {
                let now = self.now();
                let mode = self.config.apply_umask(mode);
                self.tree
                    .insert(
                        parent,
                        path.file_name(),
                        FileType::RegularFile,
                        mode,
                        Vec::new(),
                        now,
                    )
                    .map_err(fail)?
            }
            Resolution::DirMarked => return Err(fail(ErrorKind::IsADirectory)),
            Resolution::ParentIsFile => return Err(fail(ErrorKind::NotADirectory)),
            Resolution::Missing => return Err(fail(ErrorKind::NotFound)),
        };

        Ok(self.open_descriptor(node, flags))
    }

    // Breadth-first listing of every node, used by the `Display` dump.
    fn nodes_breadth_first(&self) -> Vec<Node> {
        let mut order = vec![];
        let mut queue = VecDeque::from([self.tree.root_node()]);

        while let Some(node) = queue.pop_front() {
            order.push(node);
            queue.extend(self.tree.children(node));
        }

        order
    }
}

impl FileSystem for MemFs {
    fn create(&mut self, path: &str) -> Result<Fd, Error> {
        let mode = self.config.file_mode;
        self.create_file(path, OpenFlags::READ_WRITE, mode)
    }

    fn open(&mut self, path: &str) -> Result<Fd, Error> {
        let node = self.find("open", path)?;
        Ok(self.open_descriptor(node, OpenFlags::READ_ONLY))
    }

    fn open_file(&mut self, raw: &str, flags: OpenFlags, mode: u32) -> Result<Fd, Error> {
        let path = CanonicalPath::new(raw);
        let fail = |kind| Error::new("open", raw, kind);

        match resolve(&self.tree, &path) {
            Resolution::Found(node) => {
                if self.is_dir(node) {
                    return Err(fail(ErrorKind::IsADirectory));
                }
                if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
                    return Err(fail(ErrorKind::AlreadyExists));
                }
                if flags.contains(OpenFlags::TRUNCATE) {
                    let now = self.now();
                    self.tree.set_content(node, Vec::new(), now).map_err(fail)?;
                    debug!(path = %path.path, "file truncated on open");
                }
                Ok(self.open_descriptor(node, flags))
            }
            Resolution::Creatable { .. } if flags.contains(OpenFlags::CREATE) => {
                self.create_file(raw, flags, mode)
            }
            Resolution::DirMarked => Err(fail(ErrorKind::IsADirectory)),
            Resolution::ParentIsFile => Err(fail(ErrorKind::NotADirectory)),
            Resolution::Creatable { .. } | Resolution::Missing => Err(fail(ErrorKind::NotFound)),
        }
    }

    fn stat(&self, path: &str) -> Result<Metadata, Error> {
        let node = self.find("stat", path)?;
        self.tree
            .metadata(node)
            .map_err(|kind| Error::new("stat", path, kind))
    }

    fn walk_dir(&self, root: &str, visitor: &mut WalkFn<'_>) -> Result<(), Error> {
        let start = match self.find("lstat", root) {
            Ok(node) => node,
            Err(err) => {
                // the visitor decides whether a missing root is fatal
                let path = CanonicalPath::new(root);
                visitor(&path.path, None, Some(err))?;
                return Ok(());
            }
        };

        walk_nodes(&self.tree, start, &mut |_, data: &NodeData| {
            let metadata = data.metadata();
            visitor(&data.path, Some(&metadata), None)
        })?;

        Ok(())
    }

    fn truncate(&mut self, path: &str, size: i64) -> Result<(), Error> {
        let fail = |kind| Error::new("truncate", path, kind);

        let node = self.find("truncate", path)?;
        let current = match self.tree.get(node) {
            Some(data) if data.is_dir() => return Err(fail(ErrorKind::IsADirectory)),
            Some(data) => data.content.len() as FileSize,
            None => return Err(fail(ErrorKind::NotFound)),
        };

        let size = FileSize::try_from(size).map_err(|_| fail(ErrorKind::InvalidArgument))?;
        if size > current && self.config.truncate_growth == TruncateGrowth::Reject {
            return Err(fail(ErrorKind::InvalidArgument));
        }

        let now = self.now();
        self.tree.resize(node, size, now).map_err(fail)?;
        debug!(path, from = current, to = size, "file truncated");

        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        let node = self.find("open", path)?;
        match self.tree.get(node) {
            Some(data) if data.is_dir() => Err(Error::new("read", path, ErrorKind::IsADirectory)),
            Some(data) => Ok(data.content.clone()),
            None => Err(Error::new("open", path, ErrorKind::NotFound)),
        }
    }

    fn write_file(&mut self, raw: &str, data: &[u8], mode: u32) -> Result<(), Error> {
        let path = CanonicalPath::new(raw);
        let fail = |kind| Error::new("open", raw, kind);
        let now = self.now();

        match resolve(&self.tree, &path) {
            Resolution::Found(node) => {
                if self.is_dir(node) {
                    return Err(fail(ErrorKind::IsADirectory));
                }
                self.tree
                    .set_content(node, data.to_vec(), now)
                    .map_err(fail)?;
            }
            Resolution::Creatable { parent } => {
                let mode = self.config.apply_umask(mode);
                self.tree
                    .insert(
                        parent,
                        path.file_name(),
                        FileType::RegularFile,
                        mode,
                        data.to_vec(),
                        now,
                    )
                    .map_err(fail)?;
            }
            Resolution::DirMarked => return Err(fail(ErrorKind::IsADirectory)),
            Resolution::ParentIsFile => return Err(fail(ErrorKind::NotADirectory)),
            Resolution::Missing => return Err(fail(ErrorKind::NotFound)),
        }

        debug!(path = %path.path, len = data.len(), "file written");
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), Error> {
        let node = self.find("remove", path)?;
        self.tree
            .unlink(node)
            .map_err(|kind| Error::new("remove", path, kind))?;
        self.release(node);

        Ok(())
    }

    fn remove_all(&mut self, path: &str) -> Result<(), Error> {
        // a missing root is reported the way `walk_dir` reports it
        let start = self.find("lstat", path)?;
        let root = self.tree.root_node();

        let mut doomed = vec![];
        walk_nodes(&self.tree, start, &mut |node, data: &NodeData| {
            if node == root {
                return Err(Error::new(
                    "remove",
                    data.path.clone(),
                    ErrorKind::PermissionDenied,
                ));
            }
            doomed.push(node);
            Ok(Visit::Continue)
        })?;

        // children before parents, so every directory is empty when it is unlinked
        for node in doomed.iter().rev().copied() {
            self.tree
                .unlink(node)
                .map_err(|kind| Error::new("remove", path, kind))?;
            self.release(node);
        }
        debug!(path, removed = doomed.len(), "subtree removed");

        Ok(())
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, Error> {
        let desc = self
            .fd_table
            .get_mut(fd)
            .map_err(|kind| Error::new("read", fd.to_string(), kind))?;

        desc.read(buf, &self.tree)
            .map_err(|kind| Error::new("read", desc.path.clone(), kind))
    }

    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, Error> {
        let desc = self
            .fd_table
            .get_mut(fd)
            .map_err(|kind| Error::new("write", fd.to_string(), kind))?;

        desc.write(buf, &mut self.tree)
            .map_err(|kind| Error::new("write", desc.path.clone(), kind))
    }

    fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<i64, Error> {
        let desc = self
            .fd_table
            .get_mut(fd)
            .map_err(|kind| Error::new("seek", fd.to_string(), kind))?;

        desc.seek(offset, whence, &self.tree)
            .map_err(|kind| Error::new("seek", desc.path.clone(), kind))
    }

    fn metadata(&self, fd: Fd) -> Result<Metadata, Error> {
        let desc = self.descriptor("stat", fd)?;
        self.tree
            .metadata(desc.node)
            .map_err(|kind| Error::new("stat", desc.path.clone(), kind))
    }

    fn close(&mut self, fd: Fd) -> Result<(), Error> {
        let desc = self
            .fd_table
            .close(fd)
            .map_err(|kind| Error::new("close", fd.to_string(), kind))?;
        self.release(desc.node);

        Ok(())
    }
}

impl fmt::Display for MemFs {
    // One line per node, breadth first, children in path order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes_breadth_first() {
            let Some(data) = self.tree.get(node) else {
                continue;
            };
            if data.is_dir() {
                writeln!(f, "{}: (Directory)", data.path)?;
            } else {
                writeln!(
                    f,
                    "{}: `{}'",
                    data.path,
                    String::from_utf8_lossy(&data.content)
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MemFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFs")
            .field("nodes", &self.tree.len())
            .field("open_descriptors", &self.fd_table.len())
            .field("config", &self.config)
            .finish()
    }
}
