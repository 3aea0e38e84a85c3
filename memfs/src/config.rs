use serde::{Deserialize, Serialize};

// default umask on common Linux systems
pub const DEFAULT_UMASK: u32 = 0o022;
pub const DEFAULT_FILE_MODE: u32 = 0o666;
pub const DEFAULT_DIR_MODE: u32 = 0o777;

/// What `truncate` does when asked for a size larger than the current content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncateGrowth {
    /// Extend the content with zero bytes, the same way a sparse write does.
    #[default]
    ZeroFill,
    /// Refuse with an invalid argument error, only shrinking is allowed.
    Reject,
}

/// Tunables of an in-memory file system instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Permission bits cleared from every requested mode.
    pub umask: u32,
    /// Requested mode of files created by `create` and the builder.
    pub file_mode: u32,
    /// Requested mode of directories created implicitly.
    pub dir_mode: u32,
    pub truncate_growth: TruncateGrowth,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            umask: DEFAULT_UMASK,
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
            truncate_growth: TruncateGrowth::default(),
        }
    }
}

impl FsConfig {
    // The umask is cleared bit by bit, so modes below the mask never borrow from higher bits.
    pub fn apply_umask(&self, mode: u32) -> u32 {
        mode & !self.umask & 0o7777
    }

    pub fn default_file_mode(&self) -> u32 {
        self.apply_umask(self.file_mode)
    }

    pub fn default_dir_mode(&self) -> u32 {
        self.apply_umask(self.dir_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_typical_linux_umask() {
        let config = FsConfig::default();

        assert_eq!(config.default_file_mode(), 0o644);
        assert_eq!(config.default_dir_mode(), 0o755);
    }

    #[test]
    fn umask_is_cleared_not_subtracted() {
        let config = FsConfig::default();

        // 0o600 - 0o022 would be 0o556
        assert_eq!(config.apply_umask(0o600), 0o600);
        assert_eq!(config.apply_umask(0o000), 0o000);
        assert_eq!(config.apply_umask(0o777), 0o755);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: FsConfig =
            serde_json::from_str(r#"{ "umask": 63, "truncate_growth": "reject" }"#).unwrap();

        assert_eq!(config.umask, 0o077);
        assert_eq!(config.file_mode, DEFAULT_FILE_MODE);
        assert_eq!(config.truncate_growth, TruncateGrowth::Reject);
        assert_eq!(config.default_file_mode(), 0o600);
    }
}
