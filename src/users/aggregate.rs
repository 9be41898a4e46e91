use std::collections::HashMap;

use crate::keys::SshKey;

use super::models::UserRecord;

/// Group items by name, keeping the order in which each name first appears and
/// the input order within a group.
fn group_by_name<T>(
    items: impl IntoIterator<Item = T>,
    name: impl Fn(&T) -> &str,
) -> Vec<(String, Vec<T>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();

    for item in items {
        let key = name(&item).to_string();
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(item),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![item]));
            }
        }
    }

    groups
}

/// Build one record per username.
///
/// A username seen once keeps its email as the comment. A username seen several
/// times gets every key line and an `email;` entry per key, repeats included.
pub fn keys_to_users(keys: &[SshKey]) -> Vec<UserRecord> {
    group_by_name(keys, |key| key.username.as_str())
        .into_iter()
        .map(|(name, group)| {
            let mut user = UserRecord::new(name);
            if let [only] = group.as_slice() {
                user.authorized_keys.push(only.line.clone());
                user.comment = only.email.clone();
                return user;
            }
            for key in group {
                user.authorized_keys.push(key.line.clone());
                user.comment.push_str(&key.email);
                user.comment.push(';');
            }
            user
        })
        .collect()
}

/// Collapse records sharing a name into one.
///
/// Unique names pass through untouched. Duplicates are merged by concatenating
/// their keys in input order and appending each comment followed by `;`.
pub fn merge_users(users: Vec<UserRecord>) -> Vec<UserRecord> {
    group_by_name(users, |user| user.name.as_str())
        .into_iter()
        .map(|(name, mut group)| {
            if group.len() == 1 {
                return group.remove(0);
            }

            let mut merged = UserRecord::new(name);
            merged.shell = group[0].shell.clone();
            for user in group {
                merged.authorized_keys.extend(user.authorized_keys);
                merged.comment.push_str(&user.comment);
                merged.comment.push(';');
                merged.sudoer |= user.sudoer;
            }
            merged
        })
        .collect()
}
