pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod fs;
pub mod host;
pub mod storage;

mod runtime;

pub use builder::MemFsBuilder;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{FsConfig, TruncateGrowth};
pub use error::{Error, ErrorKind};
pub use fs::{FileSystem, MemFs};
pub use host::HostFs;

#[cfg(test)]
mod test_utils;
