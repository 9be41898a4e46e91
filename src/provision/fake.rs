use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::users::UserRecord;

use super::{ProvisionError, Provisioner};

/// A provisioner call, as recorded by [`FakeProvisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    ReadAuthorizedKeys(String),
    Create(String),
    InstallAuthorizedKeys(String, Vec<String>),
    GrantSudo(String),
}

/// In-memory host: a set of accounts with their authorized_keys lines.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    accounts: RefCell<HashMap<String, Vec<String>>>,
    calls: RefCell<Vec<Call>>,
    fail_create: HashSet<String>,
    fail_sudo: HashSet<String>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, name: &str, authorized_keys: &[&str]) -> Self {
        self.accounts.borrow_mut().insert(
            name.to_string(),
            authorized_keys.iter().map(|k| k.to_string()).collect(),
        );
        self
    }

    pub fn failing_create(mut self, name: &str) -> Self {
        self.fail_create.insert(name.to_string());
        self
    }

    pub fn failing_sudo(mut self, name: &str) -> Self {
        self.fail_sudo.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Calls that change the host, in order, for one user.
    pub fn mutations_for(&self, name: &str) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| match call {
                Call::Create(n) | Call::GrantSudo(n) | Call::InstallAuthorizedKeys(n, _) => {
                    n == name
                }
                _ => false,
            })
            .cloned()
            .collect()
    }

    pub fn authorized_keys(&self, name: &str) -> Option<Vec<String>> {
        self.accounts.borrow().get(name).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Provisioner for FakeProvisioner {
    fn exists(&self, name: &str) -> Result<bool, ProvisionError> {
        self.record(Call::Exists(name.to_string()));
        Ok(self.accounts.borrow().contains_key(name))
    }

    fn read_authorized_keys(&self, name: &str) -> Result<Vec<String>, ProvisionError> {
        self.record(Call::ReadAuthorizedKeys(name.to_string()));
        Ok(self.accounts.borrow().get(name).cloned().unwrap_or_default())
    }

    fn create(&self, user: &UserRecord) -> Result<(), ProvisionError> {
        self.record(Call::Create(user.name.clone()));
        if self.fail_create.contains(&user.name) {
            return Err(ProvisionError::CommandFailed {
                command: format!("useradd {}", user.name),
                status: Some(9),
                stderr: format!("useradd: user '{}' already exists", user.name),
            });
        }
        self.accounts
            .borrow_mut()
            .insert(user.name.clone(), Vec::new());
        Ok(())
    }

    fn install_authorized_keys(&self, user: &UserRecord) -> Result<(), ProvisionError> {
        self.record(Call::InstallAuthorizedKeys(
            user.name.clone(),
            user.authorized_keys.clone(),
        ));
        let mut accounts = self.accounts.borrow_mut();
        let keys = accounts
            .get_mut(&user.name)
            .ok_or_else(|| ProvisionError::NoSuchUser(user.name.clone()))?;
        keys.extend(user.authorized_keys.iter().map(|k| k.trim().to_string()));
        Ok(())
    }

    fn grant_sudo(&self, user: &UserRecord) -> Result<(), ProvisionError> {
        self.record(Call::GrantSudo(user.name.clone()));
        if self.fail_sudo.contains(&user.name) {
            return Err(ProvisionError::SudoersValidation {
                line: user.sudoers_line(),
                output: "syntax error".to_string(),
            });
        }
        Ok(())
    }
}
