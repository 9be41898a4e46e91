//! Per-user provisioning and the batch summary

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;

use crate::provision::{ProvisionError, Provisioner};
use crate::ui::prelude::*;
use crate::users::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lookup,
    Create,
    AuthorizedKeys,
    Sudo,
}

impl Stage {
    fn describe(self) -> &'static str {
        match self {
            Stage::Lookup => "look up",
            Stage::Create => "create",
            Stage::AuthorizedKeys => "add ssh keys for",
            Stage::Sudo => "authorize sudo rights for",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub user: String,
    pub stage: Stage,
    pub error: String,
}

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub failed: Vec<Failure>,
}

impl RunReport {
    fn fail(&mut self, user: &str, stage: Stage, err: ProvisionError) {
        emit(
            Level::Error,
            "provision.user.failed",
            &format!("Failed to {} user '{}': {}", stage.describe(), user, err),
            Some(serde_json::json!({ "user": user, "stage": stage })),
        );
        self.failed.push(Failure {
            user: user.to_string(),
            stage,
            error: err.to_string(),
        });
    }
}

/// Provision every user in turn. Failures are recorded per user and never stop
/// the batch.
pub fn provision_users(users: &[UserRecord], provisioner: &dyn Provisioner) -> RunReport {
    let mut report = RunReport::default();
    for user in users {
        provision_user(user, provisioner, &mut report);
    }
    report
}

fn provision_user(user: &UserRecord, provisioner: &dyn Provisioner, report: &mut RunReport) {
    let exists = match provisioner.exists(&user.name) {
        Ok(exists) => exists,
        Err(err) => return report.fail(&user.name, Stage::Lookup, err),
    };

    if exists {
        emit(
            Level::Info,
            "provision.user.exists",
            &format!(
                "User '{}' already exists. Appending {} SSH key(s) to its authorized_keys.",
                user.name,
                user.authorized_keys.len()
            ),
            None,
        );
        match provisioner.install_authorized_keys(user) {
            Ok(()) => report.updated.push(user.name.clone()),
            Err(err) => report.fail(&user.name, Stage::AuthorizedKeys, err),
        }
        return;
    }

    if let Err(err) = provisioner.create(user) {
        return report.fail(&user.name, Stage::Create, err);
    }
    emit(
        Level::Success,
        "provision.user.created",
        &format!("User '{}' successfully created", user.name),
        None,
    );
    report.created.push(user.name.clone());

    if let Err(err) = provisioner.install_authorized_keys(user) {
        report.fail(&user.name, Stage::AuthorizedKeys, err);
    }

    if user.sudoer
        && let Err(err) = provisioner.grant_sudo(user)
    {
        report.fail(&user.name, Stage::Sudo, err);
    }
}

fn build_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["User", "Result", "Details"]);

    for name in &report.created {
        table.add_row(vec![name.as_str(), "created", ""]);
    }
    for name in &report.updated {
        table.add_row(vec![name.as_str(), "keys appended", ""]);
    }
    for failure in &report.failed {
        table.add_row(vec![
            failure.user.as_str(),
            "failed",
            failure.error.as_str(),
        ]);
    }
    table
}

/// Print the run summary: a table in text mode, one event in JSON mode.
pub fn print_report(report: &RunReport) {
    let message = format!(
        "{} created, {} updated, {} failure(s)",
        report.created.len(),
        report.updated.len(),
        report.failed.len()
    );

    match get_output_format() {
        OutputFormat::Json => {
            let data = serde_json::to_value(report).ok();
            emit(Level::Info, "run.summary", &message, data);
        }
        OutputFormat::Text => {
            if !report.created.is_empty() || !report.updated.is_empty() || !report.failed.is_empty()
            {
                crate::ui::print_block(&build_table(report).to_string());
            }
            let level = if report.failed.is_empty() {
                Level::Success
            } else {
                Level::Warn
            };
            emit(level, "run.summary", &message, None);
        }
    }
}
