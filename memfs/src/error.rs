use std::io;

// The class of a failure, mirrors the POSIX error codes a real file system would return.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("file exists")]
    AlreadyExists,
    #[error("directory not empty")]
    NotEmpty,
    #[error("operation not permitted")]
    PermissionDenied,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("file already closed")]
    Closed,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("file too large")]
    FileTooLarge,
    #[error("{0}")]
    Io(io::ErrorKind),
}

impl ErrorKind {
    // Classify a host error into the same taxonomy the in-memory engine uses.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::NotADirectory => ErrorKind::NotADirectory,
            io::ErrorKind::IsADirectory => ErrorKind::IsADirectory,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::DirectoryNotEmpty => ErrorKind::NotEmpty,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::FileTooLarge => ErrorKind::FileTooLarge,
            other => ErrorKind::Io(other),
        }
    }

    fn io_kind(self) -> io::ErrorKind {
        match self {
            ErrorKind::NotFound => io::ErrorKind::NotFound,
            ErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            ErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::NotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::BadDescriptor | ErrorKind::Closed | ErrorKind::InvalidArgument => {
                io::ErrorKind::InvalidInput
            }
            ErrorKind::FileTooLarge => io::ErrorKind::FileTooLarge,
            ErrorKind::Io(kind) => kind,
        }
    }
}

/// A failed operation together with the path it was applied to.
///
/// The path is reported as the caller spelled it, not in canonical form.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{op} {path}: {kind}")]
pub struct Error {
    pub op: &'static str,
    pub path: String,
    pub kind: ErrorKind,
}

impl Error {
    pub fn new(op: &'static str, path: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            op,
            path: path.into(),
            kind,
        }
    }

    pub(crate) fn from_io(op: &'static str, path: impl Into<String>, err: &io::Error) -> Self {
        Self::new(op, path, ErrorKind::from_io(err))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::new(err.kind.io_kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_op_path_and_kind() {
        let err = Error::new("open", "/a/b", ErrorKind::NotFound);

        assert_eq!(err.to_string(), "open /a/b: no such file or directory");
    }

    #[test]
    fn io_conversion_keeps_class() {
        let err = Error::new("remove", "/d", ErrorKind::NotEmpty);
        let io_err: io::Error = err.clone().into();

        assert_eq!(io_err.kind(), io::ErrorKind::DirectoryNotEmpty);
        assert_eq!(ErrorKind::from_io(&io_err), ErrorKind::NotEmpty);
    }

    #[test]
    fn unknown_host_errors_are_wrapped() {
        let io_err = io::Error::from(io::ErrorKind::TimedOut);

        assert_eq!(
            ErrorKind::from_io(&io_err),
            ErrorKind::Io(io::ErrorKind::TimedOut)
        );
    }
}
