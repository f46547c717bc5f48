//! Environment constants and path utilities for tasklife.
//!
//! Hardcoded directory and file names live here so the configuration
//! discovery and the CLI agree on them.

use std::path::{Path, PathBuf};

/// Hidden application directory name
pub const TASKLIFE_DIR_NAME: &str = ".tasklife";

/// Configuration file name inside an application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Stand-alone configuration file name in a project directory
pub const LOCAL_CONFIG_FILE_NAME: &str = "tasklife.toml";

/// System-wide configuration directory (Unix-like systems)
pub const SYSTEM_CONFIG_DIR: &str = "/etc/tasklife";

/// Logging defaults
pub mod logging {
    /// Filter used when `RUST_LOG` is not set
    pub const DEFAULT_LOG_FILTER: &str = "task_lifecycle=info,tasklife=info";

    /// Filter used with `--verbose`
    pub const VERBOSE_LOG_FILTER: &str = "task_lifecycle=debug,tasklife=debug";
}

/// Build config file path in user's home directory
pub fn user_config_file_path(home_dir: &Path) -> PathBuf {
    home_dir.join(TASKLIFE_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// Build `./tasklife.toml` for a project directory
pub fn project_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(LOCAL_CONFIG_FILE_NAME)
}

/// Build `./.tasklife/config.toml` for a project directory
pub fn local_config_file_path(current_dir: &Path) -> PathBuf {
    current_dir.join(TASKLIFE_DIR_NAME).join(CONFIG_FILE_NAME)
}

pub fn system_config_file_path() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let home_dir = Path::new("/home/user");
        let current_dir = Path::new("/current/project");

        assert_eq!(
            user_config_file_path(home_dir),
            Path::new("/home/user/.tasklife/config.toml")
        );
        assert_eq!(
            project_config_file_path(current_dir),
            Path::new("/current/project/tasklife.toml")
        );
        assert_eq!(
            local_config_file_path(current_dir),
            Path::new("/current/project/.tasklife/config.toml")
        );
        assert_eq!(
            system_config_file_path(),
            Path::new("/etc/tasklife/config.toml")
        );
    }
}
