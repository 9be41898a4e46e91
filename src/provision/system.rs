use std::path::{Path, PathBuf};
use std::process::Command;

use nix::unistd::User;
use sudo::RunningAs;

use crate::config::{AccountOptions, Config};
use crate::ui::prelude::*;
use crate::users::UserRecord;

use super::authorized_keys::{self, Owner};
use super::{CommandExecutor, ExecutionMode, ProvisionError, Provisioner, sudoers};

/// Provisioner backed by the local passwd database, `useradd` and `visudo`.
pub struct SystemProvisioner {
    executor: CommandExecutor,
    config: Config,
    useradd: PathBuf,
    visudo: Option<PathBuf>,
}

impl SystemProvisioner {
    /// Check privileges and locate the programs a run will need.
    ///
    /// In live mode a missing program or a non-root caller is fatal. In dry-run
    /// mode both only warn, since nothing gets executed.
    pub fn new(mode: ExecutionMode, config: Config) -> Result<Self, ProvisionError> {
        let executor = CommandExecutor::new(mode);

        if !matches!(sudo::check(), RunningAs::Root) {
            if !mode.is_dry_run() {
                return Err(ProvisionError::NotRoot);
            }
            emit(
                Level::Warn,
                "provision.privileges",
                "Not running as root; dry-run output may differ from a real run.",
                None,
            );
        }

        let useradd = locate("useradd", mode)?;
        let visudo = if config.grant_sudo {
            Some(locate("visudo", mode)?)
        } else {
            None
        };

        Ok(Self {
            executor,
            config,
            useradd,
            visudo,
        })
    }

    fn lookup(&self, name: &str) -> Result<Option<User>, ProvisionError> {
        User::from_name(name).map_err(|source| ProvisionError::Lookup {
            name: name.to_string(),
            source,
        })
    }

    /// Home directory from passwd, or where useradd will put it.
    fn home_of(&self, name: &str) -> Result<PathBuf, ProvisionError> {
        Ok(match self.lookup(name)? {
            Some(user) => user.dir,
            None => planned_home(name, &self.config),
        })
    }

    fn owner_of(&self, name: &str) -> Result<Owner, ProvisionError> {
        let user = self
            .lookup(name)?
            .ok_or_else(|| ProvisionError::NoSuchUser(name.to_string()))?;
        Ok(Owner {
            uid: user.uid,
            gid: user.gid,
        })
    }
}

fn locate(binary: &'static str, mode: ExecutionMode) -> Result<PathBuf, ProvisionError> {
    match which::which(binary) {
        Ok(path) => Ok(path),
        Err(_) if mode.is_dry_run() => {
            emit(
                Level::Warn,
                "provision.missing_binary",
                &format!("'{}' not found in PATH; a live run would fail.", binary),
                None,
            );
            Ok(PathBuf::from(binary))
        }
        Err(source) => Err(ProvisionError::MissingBinary { binary, source }),
    }
}

/// Home directory `useradd` gives a new account.
fn planned_home(name: &str, config: &Config) -> PathBuf {
    match &config.account.home_dir {
        Some(home_dir) => home_dir.clone(),
        None => config.home_root.join(name),
    }
}

/// Arguments passed to `useradd` for a new account.
pub fn useradd_args(
    user: &UserRecord,
    options: &AccountOptions,
    home_root: &Path,
) -> Vec<String> {
    let mut args = Vec::new();

    if !user.comment.is_empty() {
        args.push("--comment".to_string());
        args.push(user.comment.clone());
    }

    if let Some(home_dir) = &options.home_dir {
        args.push("--home-dir".to_string());
        args.push(home_dir.display().to_string());
    } else if home_root != Path::new("/home") {
        args.push("--base-dir".to_string());
        args.push(home_root.display().to_string());
    }

    if options.create_home {
        args.push("--create-home".to_string());
    } else {
        args.push("--no-create-home".to_string());
    }

    if let Some(group) = &options.primary_group {
        args.push("--gid".to_string());
        args.push(group.clone());
    }

    if !options.groups.is_empty() {
        args.push("--groups".to_string());
        args.push(options.groups.join(","));
    }

    if options.no_user_group {
        args.push("--no-user-group".to_string());
    }

    if options.system {
        args.push("--system".to_string());
    }

    if options.no_log_init {
        args.push("--no-log-init".to_string());
    }

    if !user.shell.is_empty() {
        args.push("--shell".to_string());
        args.push(user.shell.clone());
    }

    args.push(user.name.clone());
    args
}

impl Provisioner for SystemProvisioner {
    fn exists(&self, name: &str) -> Result<bool, ProvisionError> {
        Ok(self.lookup(name)?.is_some())
    }

    fn read_authorized_keys(&self, name: &str) -> Result<Vec<String>, ProvisionError> {
        let home = self.home_of(name)?;
        authorized_keys::read(&home)
    }

    fn create(&self, user: &UserRecord) -> Result<(), ProvisionError> {
        let mut cmd = Command::new(&self.useradd);
        cmd.args(useradd_args(user, &self.config.account, &self.config.home_root));
        self.executor.run(&mut cmd)
    }

    fn install_authorized_keys(&self, user: &UserRecord) -> Result<(), ProvisionError> {
        let home = self.home_of(&user.name)?;
        let owner = match self.executor.mode() {
            ExecutionMode::Live => Some(self.owner_of(&user.name)?),
            ExecutionMode::DryRun => None,
        };
        authorized_keys::install(
            &home,
            &user.authorized_keys_block(),
            owner,
            &user.name,
            &self.executor,
        )
    }

    fn grant_sudo(&self, user: &UserRecord) -> Result<(), ProvisionError> {
        let visudo = match &self.visudo {
            Some(path) => path.clone(),
            None => locate("visudo", self.executor.mode())?,
        };
        let line = user.sudoers_line();

        sudoers::validate(&visudo, &line, &self.executor)?;
        let path =
            sudoers::write_fragment(&self.config.sudoers_dir, &user.name, &line, &self.executor)?;

        emit(
            Level::Debug,
            "provision.sudo.written",
            &format!("Wrote '{}' to {}", line, path.display()),
            None,
        );
        Ok(())
    }
}
