use std::path::Path;

use anyhow::{Context, Result};

use crate::keys::{dedup_unordered, parse_keys, read_lines};
use crate::provision::Provisioner;
use crate::ui::prelude::*;

use super::aggregate::{keys_to_users, merge_users};
use super::models::UserRecord;

/// Read the key file at `path` and build the final set of records, including
/// keys already authorized on accounts that exist.
pub fn collect_users(path: &Path, provisioner: &dyn Provisioner) -> Result<Vec<UserRecord>> {
    let lines = read_lines(path)?;
    let keys = parse_keys(dedup_unordered(lines));
    let users = keys_to_users(&keys);

    emit(
        Level::Debug,
        "users.collect.parsed",
        &format!(
            "Parsed {} key(s) for {} user(s) from {}",
            keys.len(),
            users.len(),
            path.display()
        ),
        None,
    );

    reconcile_existing(users, provisioner)
}

/// Fold the on-host authorized_keys of every existing account back into the set.
///
/// Only the records passed in are checked; records discovered along the way are
/// not revisited. Keys from disk are appended, never replaced, so an account
/// keeps accumulating the keys it already has on every run.
pub fn reconcile_existing(
    users: Vec<UserRecord>,
    provisioner: &dyn Provisioner,
) -> Result<Vec<UserRecord>> {
    let mut discovered = Vec::new();

    for user in &users {
        let exists = provisioner
            .exists(&user.name)
            .with_context(|| format!("checking whether user '{}' exists", user.name))?;
        if !exists {
            continue;
        }

        let lines = provisioner
            .read_authorized_keys(&user.name)
            .with_context(|| format!("reading authorized keys of existing user '{}'", user.name))?;
        let keys = parse_keys(dedup_unordered(lines));

        emit(
            Level::Debug,
            "users.reconcile.existing",
            &format!(
                "User '{}' exists with {} parseable key(s) on disk",
                user.name,
                keys.len()
            ),
            None,
        );

        discovered.extend(keys_to_users(&keys));
    }

    let mut all = users;
    all.extend(discovered);
    Ok(merge_users(all))
}
