use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::ui::prelude::*;

lazy_static! {
    // type, key material, then an email whose local part is plain word characters.
    // The local part becomes the account name.
    static ref KEY_LINE: Regex =
        Regex::new(r"(\S*) (\S*) (([0-9A-Za-z_]*)@.*)").expect("key line pattern is valid");
}

/// Key algorithms accepted for provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KeyType {
    #[serde(rename = "ssh-rsa")]
    Rsa,
    #[serde(rename = "ssh-dss")]
    Dss,
    #[serde(rename = "ssh-ed25519")]
    Ed25519,
    #[serde(rename = "ecdsa-sha2-nistp256")]
    EcdsaNistp256,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Rsa => "ssh-rsa",
            KeyType::Dss => "ssh-dss",
            KeyType::Ed25519 => "ssh-ed25519",
            KeyType::EcdsaNistp256 => "ecdsa-sha2-nistp256",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{0}' is not a known SSH key type")]
pub struct UnknownKeyType(pub String);

impl FromStr for KeyType {
    type Err = UnknownKeyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh-rsa" => Ok(KeyType::Rsa),
            "ssh-dss" => Ok(KeyType::Dss),
            "ssh-ed25519" => Ok(KeyType::Ed25519),
            "ecdsa-sha2-nistp256" => Ok(KeyType::EcdsaNistp256),
            other => Err(UnknownKeyType(other.to_string())),
        }
    }
}

/// One parsed public key line.
///
/// ```text
/// ssh-rsa AAAAB3Nza...bbbb test@user.com
/// ^^^^^^^ ^^^^^^^^^^^^^^^^ ^^^^^^^^^^^^^  email
///  type      key material  ^^^^           username
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKey {
    /// The matched text, written back verbatim into authorized_keys.
    pub line: String,
    pub key_type: KeyType,
    pub key: String,
    pub email: String,
    pub username: String,
}

/// Parse a single line.
///
/// Lines without a `user@domain` comment yield `None` silently. Lines with an
/// unsupported key type also yield `None`, with a warning.
pub fn parse_line(line: &str) -> Option<SshKey> {
    let caps = KEY_LINE.captures(line)?;
    let raw_type = &caps[1];

    let key_type = match raw_type.parse::<KeyType>() {
        Ok(key_type) => key_type,
        Err(err) => {
            emit(
                Level::Warn,
                "keys.parse.unknown_type",
                &format!("Skipping key for '{}': {}", &caps[3], err),
                Some(serde_json::json!({ "type": raw_type, "email": &caps[3] })),
            );
            return None;
        }
    };

    let key = SshKey {
        line: caps[0].to_string(),
        key_type,
        key: caps[2].to_string(),
        email: caps[3].to_string(),
        username: caps[4].to_string(),
    };
    emit(
        Level::Debug,
        "keys.parse.ok",
        &format!(
            "{} key {}... for '{}'",
            key.key_type,
            key.key.chars().take(16).collect::<String>(),
            key.username
        ),
        serde_json::to_value(&key).ok(),
    );
    Some(key)
}

/// Parse every line, keeping input order and dropping anything unusable.
pub fn parse_keys<I, S>(lines: I) -> Vec<SshKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_line(line.as_ref()))
        .collect()
}
