use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::users::{UserRecord, default_shell};

/// Read when no `--config` is given and the file exists.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/keyusers/config.toml";

fn default_true() -> bool {
    true
}

fn default_home_root() -> PathBuf {
    PathBuf::from("/home")
}

fn default_sudoers_dir() -> PathBuf {
    PathBuf::from("/etc/sudoers.d")
}

/// Provisioning settings, stored as TOML.
///
/// ```toml
/// shell = "/bin/zsh"
/// grant_sudo = false
///
/// [account]
/// groups = ["docker", "video"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Login shell for created accounts
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Install a passwordless sudoers fragment for newly created accounts
    #[serde(default = "default_true")]
    pub grant_sudo: bool,
    /// Parent of home directories; also passed to useradd as the base dir
    #[serde(default = "default_home_root")]
    pub home_root: PathBuf,
    #[serde(default = "default_sudoers_dir")]
    pub sudoers_dir: PathBuf,
    pub account: AccountOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            grant_sudo: true,
            home_root: default_home_root(),
            sudoers_dir: default_sudoers_dir(),
            account: AccountOptions::default(),
        }
    }
}

/// Extra useradd options applied to every created account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountOptions {
    /// Exact home directory for created accounts, overriding `home_root`
    pub home_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub create_home: bool,
    pub primary_group: Option<String>,
    pub groups: Vec<String>,
    pub no_user_group: bool,
    pub system: bool,
    pub no_log_init: bool,
}

impl Default for AccountOptions {
    fn default() -> Self {
        Self {
            home_dir: None,
            create_home: true,
            primary_group: None,
            groups: Vec::new(),
            no_user_group: false,
            system: false,
            no_log_init: false,
        }
    }
}

impl Config {
    /// Load from an explicit path, which must exist, or from the default
    /// location when present. Falls back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config at {}", path.display()))
    }

    /// Stamp account-level settings onto every record before provisioning.
    pub fn apply_to(&self, users: &mut [UserRecord]) {
        for user in users {
            user.shell = self.shell.clone();
            user.sudoer = self.grant_sudo;
        }
    }
}
