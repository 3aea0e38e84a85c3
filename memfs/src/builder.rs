use tracing::debug;

use crate::{
    clock::{Clock, SystemClock},
    config::FsConfig,
    error::{Error, ErrorKind},
    fs::MemFs,
    runtime::path::CanonicalPath,
    storage::{
        tree::join_path,
        types::{FileType, Node},
    },
};

enum Entry {
    File { path: String, content: Vec<u8> },
    Directory { path: String },
}

/// Pre-populates a [`MemFs`] before first use.
///
/// Entries are applied in declaration order, missing ancestors are created as
/// directories with the default directory mode. Declaring the same file twice
/// keeps the last content.
#[derive(Default)]
pub struct MemFsBuilder {
    config: FsConfig,
    clock: Option<Box<dyn Clock>>,
    entries: Vec<Entry>,
}

impl MemFsBuilder {
    pub fn config(mut self, config: FsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.entries.push(Entry::File {
            path: path.into(),
            content: content.into(),
        });
        self
    }

    pub fn with_directory(mut self, path: impl Into<String>) -> Self {
        self.entries.push(Entry::Directory { path: path.into() });
        self
    }

    pub fn build(self) -> Result<MemFs, Error> {
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));
        let mut fs = MemFs::new(self.config, clock);

        for entry in self.entries {
            match entry {
                Entry::Directory { path } => {
                    make_dirs(&mut fs, &path, &CanonicalPath::new(&path).path)?;
                }
                Entry::File { path, content } => put_file(&mut fs, &path, content)?,
            }
        }

        Ok(fs)
    }
}

// Walk `canonical` from the root, creating every missing directory on the way.
fn make_dirs(fs: &mut MemFs, raw: &str, canonical: &str) -> Result<Node, Error> {
    let mode = fs.config().default_dir_mode();
    let mut node = fs.tree().root_node();
    let mut current = fs.root_path().to_string();

    for name in canonical.split('/').filter(|s| !s.is_empty()) {
        let path = join_path(&current, name);

        node = match fs.tree().lookup(&path) {
            Some(child) if fs.tree().get(child).is_some_and(|n| n.is_dir()) => child,
            Some(_) => return Err(Error::new("mkdir", raw, ErrorKind::NotADirectory)),
            None => {
                let now = fs.now();
                let child = fs
                    .tree_mut()
                    .insert(node, name, FileType::Directory, mode, Vec::new(), now)
                    .map_err(|kind| Error::new("mkdir", raw, kind))?;
                debug!(path = %path, "directory added by builder");
                child
            }
        };
        current = path;
    }

    Ok(node)
}

fn put_file(fs: &mut MemFs, raw: &str, content: Vec<u8>) -> Result<(), Error> {
    let path = CanonicalPath::new(raw);
    let fail = |kind| Error::new("open", raw, kind);

    if path.dir_marked {
        return Err(fail(ErrorKind::IsADirectory));
    }
    let Some(parent_path) = path.parent() else {
        return Err(fail(ErrorKind::IsADirectory));
    };
    let parent = make_dirs(fs, raw, parent_path)?;
    let now = fs.now();

    match fs.tree().lookup(&path.path) {
        Some(node) => fs.tree_mut().set_content(node, content, now).map_err(fail)?,
        None => {
            let mode = fs.config().default_file_mode();
            fs.tree_mut()
                .insert(
                    parent,
                    path.file_name(),
                    FileType::RegularFile,
                    mode,
                    content,
                    now,
                )
                .map_err(fail)?;
        }
    }
    debug!(path = %path.path, "file added by builder");

    Ok(())
}
