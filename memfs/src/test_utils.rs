use crate::{
    clock::FixedClock,
    config::FsConfig,
    error::Error,
    fs::{FileSystem, MemFs, OpenFlags, Visit},
};

pub const TEST_TIME: u64 = 1_000;

#[cfg(test)]
pub fn test_fs() -> MemFs {
    MemFs::new(FsConfig::default(), Box::new(FixedClock(TEST_TIME)))
}

#[cfg(test)]
pub fn test_fs_with_config(config: FsConfig) -> MemFs {
    MemFs::new(config, Box::new(FixedClock(TEST_TIME)))
}

// /a, /a/b, /a/b/y, /a/x, /c
#[cfg(test)]
pub fn sample_fs() -> MemFs {
    MemFs::builder()
        .clock(FixedClock(TEST_TIME))
        .with_file("/a/x", "x")
        .with_file("/a/b/y", "y")
        .with_file("/c", "c")
        .build()
        .unwrap()
}

#[cfg(test)]
pub fn write_text_file(fs: &mut impl FileSystem, path: &str, content: &str) -> Result<(), Error> {
    let fd = fs.open_file(
        path,
        OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        0o666,
    )?;
    fs.write(fd, content.as_bytes())?;
    fs.close(fd)
}

#[cfg(test)]
pub fn read_text_file(fs: &mut impl FileSystem, path: &str) -> Result<String, Error> {
    let fd = fs.open(path)?;

    let mut content = vec![];
    let mut buf = [0u8; 7];
    loop {
        let n = fs.read(fd, &mut buf)?;
        if n == 0 {
            break;
        }
        content.extend_from_slice(&buf[..n]);
    }
    fs.close(fd)?;

    Ok(String::from_utf8_lossy(&content).into_owned())
}

// Paths in visiting order, `skip` decides what to return for each of them.
#[cfg(test)]
pub fn walk_paths(
    fs: &impl FileSystem,
    root: &str,
    skip: impl Fn(&str) -> Visit,
) -> Result<Vec<String>, Error> {
    let mut paths = vec![];
    fs.walk_dir(root, &mut |path, _, err| {
        if let Some(err) = err {
            return Err(err);
        }
        paths.push(path.to_string());
        Ok(skip(path))
    })?;
    Ok(paths)
}
