use serde::Serialize;

/// Default shell for new users
pub fn default_shell() -> String {
    "/bin/bash".to_string()
}

/// An account to provision, with every key that should be authorized for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub name: String,
    /// Raw key lines, in the order they were collected.
    pub authorized_keys: Vec<String>,
    /// Emails the keys came from, used as the GECOS comment.
    pub comment: String,
    pub shell: String,
    pub sudoer: bool,
}

impl UserRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorized_keys: Vec::new(),
            comment: String::new(),
            shell: default_shell(),
            sudoer: false,
        }
    }

    /// The block appended to authorized_keys: trimmed keys, one per line,
    /// always ending in a newline.
    pub fn authorized_keys_block(&self) -> String {
        let mut block = self
            .authorized_keys
            .iter()
            .map(|key| key.trim())
            .collect::<Vec<_>>()
            .join("\n");
        block.push('\n');
        block
    }

    pub fn sudoers_line(&self) -> String {
        format!("{} ALL=(ALL) NOPASSWD:ALL", self.name)
    }
}
