// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations for the configuration file and the history
//! repository when the user does not supply them.

use std::path::PathBuf;

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/greenwall/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("greenwall").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the history repository.
///
/// Uses `$XDG_DATA_HOME/greenwall/history` as the default. Does not check if
/// the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if data directory cannot be determined.
pub fn default_repo_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("greenwall").join("history"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
