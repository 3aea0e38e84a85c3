use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::trace;

use crate::{
    error::{Error, ErrorKind},
    fs::{Fd, FileSystem, Metadata, OpenFlags, Times, Visit, Whence, WalkFn},
    storage::types::{FileSize, FileType},
};

const RESERVED_FD_COUNT: Fd = 3;

struct HostHandle {
    path: String,
    file: File,
}

/// Forwards every operation to the host file system.
///
/// Paths are used as given, relative paths resolve against the process working
/// directory. Descriptors are numbered the same way [`crate::fs::MemFs`] numbers them.
pub struct HostFs {
    handles: BTreeMap<Fd, HostHandle>,
    next_fd: Fd,
}

impl Default for HostFs {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFs {
    pub fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
            next_fd: RESERVED_FD_COUNT,
        }
    }

    fn register(&mut self, path: &str, file: File) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        trace!(fd, path, "host descriptor opened");

        self.handles.insert(
            fd,
            HostHandle {
                path: path.to_string(),
                file,
            },
        );
        fd
    }

    // Closed handles are dropped from the table, a number handed out before is reported as closed.
    fn missing(&self, op: &'static str, fd: Fd) -> Error {
        let kind = if (RESERVED_FD_COUNT..self.next_fd).contains(&fd) {
            ErrorKind::Closed
        } else {
            ErrorKind::BadDescriptor
        };
        Error::new(op, fd.to_string(), kind)
    }

    fn file(&mut self, op: &'static str, fd: Fd) -> Result<(&mut File, &str), Error> {
        let missing = self.missing(op, fd);
        let handle = self.handles.get_mut(&fd).ok_or(missing)?;
        Ok((&mut handle.file, handle.path.as_str()))
    }

    fn open_with(&mut self, path: &str, options: &OpenOptions) -> Result<Fd, Error> {
        let file = options
            .open(path)
            .map_err(|e| Error::from_io("open", path, &e))?;
        Ok(self.register(path, file))
    }
}

fn set_mode(options: &mut OpenOptions, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = (options, mode);
}

fn nanos(time: std::io::Result<SystemTime>) -> u64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn to_metadata(path: &str, meta: &fs::Metadata) -> Metadata {
    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o7777
    };
    #[cfg(not(unix))]
    let mode = if meta.permissions().readonly() { 0o444 } else { 0o666 };

    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    Metadata {
        path: path.to_string(),
        name,
        file_type: if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::RegularFile
        },
        mode,
        size: meta.len() as FileSize,
        times: Times {
            created: nanos(meta.created()),
            modified: nanos(meta.modified()),
        },
    }
}

fn walk_host(path: &str, visitor: &mut WalkFn<'_>) -> Result<bool, Error> {
    let meta = fs::symlink_metadata(path).map_err(|e| Error::from_io("lstat", path, &e))?;
    let metadata = to_metadata(path, &meta);

    match visitor(path, Some(&metadata), None)? {
        Visit::SkipAll => return Ok(false),
        Visit::SkipDir => return Ok(true),
        Visit::Continue => {}
    }
    if !meta.is_dir() {
        return Ok(true);
    }

    let mut children = fs::read_dir(path)
        .map_err(|e| Error::from_io("readdir", path, &e))?
        .map(|entry| entry.map(|e| e.path().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::from_io("readdir", path, &e))?;
    children.sort();

    for child in children {
        if !walk_host(&child, visitor)? {
            return Ok(false);
        }
    }

    Ok(true)
}

impl FileSystem for HostFs {
    fn create(&mut self, path: &str) -> Result<Fd, Error> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(true);
        self.open_with(path, &options)
    }

    fn open(&mut self, path: &str) -> Result<Fd, Error> {
        let mut options = OpenOptions::new();
        options.read(true);
        self.open_with(path, &options)
    }

    fn open_file(&mut self, path: &str, flags: OpenFlags, mode: u32) -> Result<Fd, Error> {
        let mut options = OpenOptions::new();
        options
            .read(flags.can_read())
            .write(flags.can_write())
            .append(flags.contains(OpenFlags::APPEND))
            .truncate(flags.contains(OpenFlags::TRUNCATE));

        if flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
            options.create_new(true);
        } else if flags.contains(OpenFlags::CREATE) {
            options.create(true);
        }
        set_mode(&mut options, mode);

        self.open_with(path, &options)
    }

    fn stat(&self, path: &str) -> Result<Metadata, Error> {
        let meta = fs::metadata(path).map_err(|e| Error::from_io("stat", path, &e))?;
        Ok(to_metadata(path, &meta))
    }

    fn walk_dir(&self, root: &str, visitor: &mut WalkFn<'_>) -> Result<(), Error> {
        if let Err(err) = fs::symlink_metadata(root) {
            visitor(root, None, Some(Error::from_io("lstat", root, &err)))?;
            return Ok(());
        }

        walk_host(root, visitor)?;
        Ok(())
    }

    fn truncate(&mut self, path: &str, size: i64) -> Result<(), Error> {
        let size =
            u64::try_from(size).map_err(|_| Error::new("truncate", path, ErrorKind::InvalidArgument))?;

        OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_len(size))
            .map_err(|e| Error::from_io("truncate", path, &e))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        fs::read(path).map_err(|e| Error::from_io("read", path, &e))
    }

    fn write_file(&mut self, path: &str, data: &[u8], mode: u32) -> Result<(), Error> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        set_mode(&mut options, mode);

        let mut file = options
            .open(path)
            .map_err(|e| Error::from_io("open", path, &e))?;
        file.write_all(data)
            .map_err(|e| Error::from_io("write", path, &e))
    }

    fn remove(&mut self, path: &str) -> Result<(), Error> {
        let meta = fs::symlink_metadata(path).map_err(|e| Error::from_io("remove", path, &e))?;

        let result = if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| Error::from_io("remove", path, &e))
    }

    fn remove_all(&mut self, path: &str) -> Result<(), Error> {
        let meta = fs::symlink_metadata(path).map_err(|e| Error::from_io("remove", path, &e))?;

        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| Error::from_io("remove", path, &e))
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, Error> {
        let (file, path) = self.file("read", fd)?;
        file.read(buf).map_err(|e| Error::from_io("read", path, &e))
    }

    fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, Error> {
        let (file, path) = self.file("write", fd)?;
        file.write_all(buf)
            .map(|_| buf.len())
            .map_err(|e| Error::from_io("write", path, &e))
    }

    fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<i64, Error> {
        let (file, path) = self.file("seek", fd)?;
        let pos = match whence {
            Whence::SET => SeekFrom::Start(
                u64::try_from(offset)
                    .map_err(|_| Error::new("seek", path, ErrorKind::InvalidArgument))?,
            ),
            Whence::CUR => SeekFrom::Current(offset),
            Whence::END => SeekFrom::End(offset),
        };

        let cursor = file
            .seek(pos)
            .map_err(|e| Error::from_io("seek", path, &e))?;
        i64::try_from(cursor).map_err(|_| Error::new("seek", path, ErrorKind::InvalidArgument))
    }

    fn metadata(&self, fd: Fd) -> Result<Metadata, Error> {
        let handle = self
            .handles
            .get(&fd)
            .ok_or_else(|| self.missing("stat", fd))?;

        let meta = handle
            .file
            .metadata()
            .map_err(|e| Error::from_io("stat", handle.path.clone(), &e))?;
        Ok(to_metadata(&handle.path, &meta))
    }

    fn close(&mut self, fd: Fd) -> Result<(), Error> {
        let handle = self
            .handles
            .remove(&fd)
            .ok_or_else(|| self.missing("close", fd))?;

        trace!(fd, path = %handle.path, "host descriptor closed");
        Ok(())
    }
}
