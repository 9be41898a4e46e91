mod config;
mod keys;
mod provision;
mod run;
mod ui;
mod users;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::Config;
use crate::provision::{ExecutionMode, SystemProvisioner};
use crate::ui::prelude::*;

/// Create Linux accounts from a list of SSH public keys
///
/// Every key's comment must carry an email; its local part becomes the account
/// name. Missing accounts are created, keys are appended to
/// ~/.ssh/authorized_keys and new accounts get passwordless sudo.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Cli {
    /// File with SSH keys and user emails, in ~/.ssh/authorized_keys format
    #[arg(short, long, default_value = "users")]
    file: PathBuf,

    /// Do not execute commands, just print them
    #[arg(long)]
    dry_run: bool,

    /// Configuration file (defaults to /etc/keyusers/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not grant sudo rights to created accounts
    #[arg(long)]
    no_sudo: bool,

    /// Login shell for created accounts
    #[arg(long)]
    shell: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Show debug messages
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();

    ui::init(cli.format, !cli.no_color);
    ui::set_debug_mode(cli.debug);

    if let Err(err) = run_cli(&cli) {
        emit(
            Level::Error,
            "keyusers.fatal",
            &format!("Error: {:#}", err),
            None,
        );
        std::process::exit(1);
    }
}

fn run_cli(cli: &Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(shell) = &cli.shell {
        config.shell = shell.clone();
    }
    if cli.no_sudo {
        config.grant_sudo = false;
    }

    let mode = ExecutionMode::from_dry_run(cli.dry_run);
    if mode.is_dry_run() {
        emit(
            Level::Info,
            "keyusers.dry_run",
            "*** DRY RUN MODE ENABLED - No changes will be made ***",
            None,
        );
    }

    let provisioner = SystemProvisioner::new(mode, config.clone())?;

    let mut users = users::collect_users(&cli.file, &provisioner)?;
    config.apply_to(&mut users);

    emit(
        Level::Debug,
        "keyusers.users",
        &format!("{} user(s) to provision", users.len()),
        Some(serde_json::json!({ "users": &users })),
    );

    let report = run::provision_users(&users, &provisioner);
    run::print_report(&report);
    Ok(())
}
