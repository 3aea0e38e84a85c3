use std::collections::BTreeMap;

use tracing::trace;

use crate::{
    error::ErrorKind,
    runtime::types::{Fd, OpenFlags, Whence},
    storage::{NodeTree, types::Node},
};

const RESERVED_FD_COUNT: Fd = 3;

// An open handle: the node it refers to, a private cursor and the flags captured at open time.
// The content itself lives in the tree, so every descriptor of a node sees the same bytes.
// A descriptor only exists while it is open, closing it drops it from the `FdTable`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub node: Node,
    // canonical path at open time, used for error reports
    pub path: String,
    pub cursor: i64,
    pub flags: OpenFlags,
}

impl Descriptor {
    pub fn new(node: Node, path: impl Into<String>, flags: OpenFlags) -> Self {
        Self {
            node,
            path: path.into(),
            cursor: 0,
            flags,
        }
    }

    // Read at the cursor and advance it by the number of bytes copied.
    // Zero bytes at or past the end of the content signals end of stream.
    pub fn read(&mut self, buf: &mut [u8], tree: &NodeTree) -> Result<usize, ErrorKind> {
        let data = tree.get(self.node).ok_or(ErrorKind::NotFound)?;
        if data.is_dir() || !self.flags.can_read() {
            return Err(ErrorKind::IsADirectory);
        }

        let offset = u64::try_from(self.cursor).map_err(|_| ErrorKind::InvalidArgument)?;
        let n = tree.read_at(self.node, offset, buf)?;
        self.cursor += n as i64;
        Ok(n)
    }

    // Write the whole buffer at the cursor, or at the end in append mode.
    pub fn write(&mut self, buf: &[u8], tree: &mut NodeTree) -> Result<usize, ErrorKind> {
        let data = tree.get(self.node).ok_or(ErrorKind::NotFound)?;
        if data.is_dir() || !self.flags.can_write() {
            return Err(ErrorKind::BadDescriptor);
        }

        if self.flags.contains(OpenFlags::APPEND) {
            self.cursor = data.content.len() as i64;
        }

        let offset = u64::try_from(self.cursor).map_err(|_| ErrorKind::InvalidArgument)?;
        let n = tree.write_at(self.node, offset, buf)?;
        self.cursor += n as i64;
        Ok(n)
    }

    // Move the cursor, any position is accepted, problems surface on the next read or write.
    pub fn seek(&mut self, offset: i64, whence: Whence, tree: &NodeTree) -> Result<i64, ErrorKind> {
        let base = match whence {
            Whence::SET => 0,
            Whence::CUR => self.cursor,
            Whence::END => tree
                .get(self.node)
                .map(|n| n.content.len() as i64)
                .ok_or(ErrorKind::NotFound)?,
        };

        self.cursor = base
            .checked_add(offset)
            .ok_or(ErrorKind::InvalidArgument)?;
        Ok(self.cursor)
    }

    pub fn tell(&self) -> i64 {
        self.cursor
    }
}

// Descriptors handed out by a file system instance.
// Numbers are never reused, so any number below `next_fd` that is missing from
// the table was closed, and a second close of it is always detected.
pub struct FdTable {
    table: BTreeMap<Fd, Descriptor>,
    node_refcount: BTreeMap<Node, usize>,
    next_fd: Fd,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            table: BTreeMap::default(),
            node_refcount: BTreeMap::default(),
            next_fd: RESERVED_FD_COUNT,
        }
    }

    // Number of open descriptors referring to `node`.
    pub fn refcount(&self, node: Node) -> usize {
        self.node_refcount.get(&node).copied().unwrap_or(0)
    }

    pub fn open(&mut self, descriptor: Descriptor) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;

        *self.node_refcount.entry(descriptor.node).or_default() += 1;
        trace!(fd, node = descriptor.node, flags = ?descriptor.flags, "descriptor opened");

        self.table.insert(fd, descriptor);
        fd
    }

    // Number of entries held, equal to the number of open descriptors.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, fd: Fd) -> Result<&Descriptor, ErrorKind> {
        self.table.get(&fd).ok_or_else(|| self.missing(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut Descriptor, ErrorKind> {
        let missing = self.missing(fd);
        self.table.get_mut(&fd).ok_or(missing)
    }

    // Close a descriptor and return its node, so that the caller can release it if unreferenced.
    pub fn close(&mut self, fd: Fd) -> Result<Descriptor, ErrorKind> {
        let missing = self.missing(fd);
        let descriptor = self.table.remove(&fd).ok_or(missing)?;
        let node = descriptor.node;

        if let Some(refcount) = self.node_refcount.get_mut(&node) {
            *refcount -= 1;
            if *refcount == 0 {
                self.node_refcount.remove(&node);
            }
        }
        trace!(fd, node, "descriptor closed");

        Ok(descriptor)
    }

    // Why `fd` has no entry: it was handed out and closed since, or it never was.
    fn missing(&self, fd: Fd) -> ErrorKind {
        if (RESERVED_FD_COUNT..self.next_fd).contains(&fd) {
            ErrorKind::Closed
        } else {
            ErrorKind::BadDescriptor
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{tree::ROOT_NODE, types::FileType};

    use super::*;

    fn tree_with_file(content: &[u8]) -> (NodeTree, Node) {
        let mut tree = NodeTree::new(0o755, 0);
        let node = tree
            .insert(ROOT_NODE, "f", FileType::RegularFile, 0o644, content.to_vec(), 0)
            .unwrap();
        (tree, node)
    }

    #[test]
    fn read_advances_cursor_until_end() {
        let (tree, node) = tree_with_file(b"hello");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::READ_ONLY);

        let mut buf = [0u8; 3];
        assert_eq!(fd.read(&mut buf, &tree), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(fd.read(&mut buf, &tree), Ok(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(fd.read(&mut buf, &tree), Ok(0));
        assert_eq!(fd.tell(), 5);
    }

    #[test]
    fn read_only_descriptor_cannot_write() {
        let (mut tree, node) = tree_with_file(b"hello");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::READ_ONLY);

        assert_eq!(fd.write(b"x", &mut tree), Err(ErrorKind::BadDescriptor));
    }

    #[test]
    fn write_only_descriptor_cannot_read() {
        let (tree, node) = tree_with_file(b"hello");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::WRITE_ONLY);

        let mut buf = [0u8; 1];
        assert_eq!(fd.read(&mut buf, &tree), Err(ErrorKind::IsADirectory));
    }

    #[test]
    fn directories_refuse_io() {
        let mut tree = NodeTree::new(0o755, 0);
        let mut fd = Descriptor::new(ROOT_NODE, "/", OpenFlags::READ_WRITE);

        let mut buf = [0u8; 1];
        assert_eq!(fd.read(&mut buf, &tree), Err(ErrorKind::IsADirectory));
        assert_eq!(fd.write(b"x", &mut tree), Err(ErrorKind::BadDescriptor));
    }

    #[test]
    fn append_forces_cursor_to_end() {
        let (mut tree, node) = tree_with_file(b"abc");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::WRITE_ONLY | OpenFlags::APPEND);

        fd.seek(0, Whence::SET, &tree).unwrap();
        fd.write(b"de", &mut tree).unwrap();

        assert_eq!(tree.get(node).unwrap().content, b"abcde");
        assert_eq!(fd.tell(), 5);
    }

    #[test]
    fn seek_accepts_any_position() {
        let (tree, node) = tree_with_file(b"abcdef");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::READ_ONLY);

        assert_eq!(fd.seek(2, Whence::SET, &tree), Ok(2));
        assert_eq!(fd.seek(3, Whence::CUR, &tree), Ok(5));
        assert_eq!(fd.seek(-1, Whence::END, &tree), Ok(5));
        assert_eq!(fd.seek(10, Whence::END, &tree), Ok(16));
        assert_eq!(fd.seek(-20, Whence::CUR, &tree), Ok(-4));
    }

    #[test]
    fn negative_cursor_fails_on_io() {
        let (mut tree, node) = tree_with_file(b"abc");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::READ_WRITE);
        fd.seek(-1, Whence::SET, &tree).unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(fd.read(&mut buf, &tree), Err(ErrorKind::InvalidArgument));
        assert_eq!(fd.write(b"x", &mut tree), Err(ErrorKind::InvalidArgument));
        assert_eq!(tree.get(node).unwrap().content, b"abc");
    }

    #[test]
    fn seek_overflow_is_rejected() {
        let (tree, node) = tree_with_file(b"abc");
        let mut fd = Descriptor::new(node, "/f", OpenFlags::READ_ONLY);
        fd.seek(i64::MAX, Whence::SET, &tree).unwrap();

        assert_eq!(fd.seek(1, Whence::CUR, &tree), Err(ErrorKind::InvalidArgument));
        assert_eq!(fd.tell(), i64::MAX);
    }

    #[test]
    fn closed_descriptors_leave_the_table() {
        let mut table = FdTable::new();

        let fd = table.open(Descriptor::new(1, "/a", OpenFlags::READ_WRITE));
        assert_eq!(table.len(), 1);

        let closed = table.close(fd).unwrap();
        assert_eq!(closed.node, 1);
        assert!(table.is_empty());

        assert_eq!(table.get(fd), Err(ErrorKind::Closed));
        assert_eq!(table.get_mut(fd).err(), Some(ErrorKind::Closed));
        assert_eq!(table.close(fd), Err(ErrorKind::Closed));
    }

    #[test]
    fn fd_numbers_are_not_reused() {
        let mut table = FdTable::new();

        let fd1 = table.open(Descriptor::new(1, "/a", OpenFlags::READ_ONLY));
        table.close(fd1).unwrap();
        let fd2 = table.open(Descriptor::new(1, "/a", OpenFlags::READ_ONLY));

        assert_eq!(fd1, RESERVED_FD_COUNT);
        assert_ne!(fd1, fd2);
        assert_eq!(table.close(fd1), Err(ErrorKind::Closed));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unknown_fd_is_a_bad_descriptor() {
        let mut table = FdTable::new();
        table.open(Descriptor::new(1, "/a", OpenFlags::READ_ONLY));

        assert_eq!(table.get(0), Err(ErrorKind::BadDescriptor));
        assert_eq!(table.get(RESERVED_FD_COUNT + 1), Err(ErrorKind::BadDescriptor));
        assert_eq!(table.close(100), Err(ErrorKind::BadDescriptor));
    }

    #[test]
    fn refcount_follows_open_descriptors() {
        let mut table = FdTable::new();

        let fd1 = table.open(Descriptor::new(7, "/b", OpenFlags::READ_ONLY));
        let fd2 = table.open(Descriptor::new(7, "/b", OpenFlags::READ_WRITE));
        assert_eq!(table.refcount(7), 2);

        table.close(fd1).unwrap();
        assert_eq!(table.refcount(7), 1);

        table.close(fd2).unwrap();
        assert_eq!(table.refcount(7), 0);
        assert!(table.is_empty());
    }
}
