use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::security::{hash_secret, verify_secret};

/// Category assigned to accounts saved without one.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// One stored login. Field names on the wire are the short `u` / `p` keys
/// the vault has always used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(rename = "u")]
    pub username: String,
    #[serde(rename = "p")]
    pub secret: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl AccountRecord {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            category: default_category(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = if category.trim().is_empty() {
            default_category()
        } else {
            category
        };
        self
    }
}

/// Everything stored in the cloud vault.
///
/// Serialized to JSON, then sealed into a token. Saves always send the whole
/// struct; there is no partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPayload {
    /// SHA-256 hex verifier of the admin password; empty when no admin is set up.
    #[serde(default)]
    pub admin_hash: String,

    /// Accounts keyed by alias.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountRecord>,
}

impl VaultPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_admin(&self) -> bool {
        !self.admin_hash.is_empty()
    }

    pub fn set_admin_password(&mut self, password: &str) {
        self.admin_hash = hash_secret(password);
    }

    pub fn verify_admin(&self, password: &str) -> bool {
        verify_secret(password, &self.admin_hash)
    }

    pub fn account(&self, alias: &str) -> Option<&AccountRecord> {
        self.accounts.get(alias)
    }

    /// Insert or replace an account. Returns the previous record, if any.
    pub fn upsert_account(
        &mut self,
        alias: impl Into<String>,
        record: AccountRecord,
    ) -> Option<AccountRecord> {
        self.accounts.insert(alias.into(), record)
    }

    pub fn remove_account(&mut self, alias: &str) -> Option<AccountRecord> {
        self.accounts.remove(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Aliases grouped by category, both sorted.
    pub fn categories(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (alias, record) in &self.accounts {
            let category = if record.category.is_empty() {
                DEFAULT_CATEGORY
            } else {
                record.category.as_str()
            };
            grouped
                .entry(category.to_string())
                .or_default()
                .push(alias.clone());
        }
        grouped
    }
}
