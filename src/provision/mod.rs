//! Account provisioning on the local host
//!
//! Everything that touches the system goes through the [`Provisioner`] trait so
//! the key pipeline can be exercised without root. [`SystemProvisioner`] is the
//! real implementation; it honours an explicit [`ExecutionMode`] instead of a
//! process-wide dry-run switch.

pub mod authorized_keys;
mod executor;
#[cfg(test)]
pub mod fake;
mod sudoers;
mod system;

use std::path::PathBuf;

use thiserror::Error;

use crate::users::UserRecord;

pub use executor::CommandExecutor;
pub use system::SystemProvisioner;

/// Whether side effects are carried out or only printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Live,
    DryRun,
}

impl ExecutionMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Live
        }
    }

    pub fn is_dry_run(self) -> bool {
        matches!(self, ExecutionMode::DryRun)
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("required program '{binary}' was not found in PATH")]
    MissingBinary {
        binary: &'static str,
        #[source]
        source: which::Error,
    },

    #[error("provisioning accounts requires root privileges (re-run with sudo or use --dry-run)")]
    NotRoot,

    #[error("user '{0}' does not exist")]
    NoSuchUser(String),

    #[error("looking up account '{name}': {source}")]
    Lookup {
        name: String,
        #[source]
        source: nix::Error,
    },

    #[error("command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("visudo rejected sudoers line '{line}': {output}")]
    SudoersValidation { line: String, output: String },

    #[error("refusing to use {}: {reason}", .path.display())]
    UnsafePath { path: PathBuf, reason: &'static str },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        ProvisionError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Host operations the provisioning run depends on.
pub trait Provisioner {
    /// Whether an account with this name exists on the host.
    fn exists(&self, name: &str) -> Result<bool, ProvisionError>;

    /// Lines of the account's current authorized_keys file. A missing file
    /// reads as empty.
    fn read_authorized_keys(&self, name: &str) -> Result<Vec<String>, ProvisionError>;

    /// Create the account.
    fn create(&self, user: &UserRecord) -> Result<(), ProvisionError>;

    /// Make sure `~/.ssh/authorized_keys` exists with the right owner and modes,
    /// then append the user's keys to it.
    fn install_authorized_keys(&self, user: &UserRecord) -> Result<(), ProvisionError>;

    /// Validate and install a passwordless sudoers fragment for the user.
    fn grant_sudo(&self, user: &UserRecord) -> Result<(), ProvisionError>;
}
