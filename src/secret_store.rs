use keyring::Entry;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result, StorageError};

const SERVICE_NAME: &str = "com.seasync.core";
const ACCOUNT_KEY: &str = "account";

/// The account record held in the secret store (§3, §6): server, username,
/// and the opaque bearer token issued by the server on login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub server_url: String,
    pub username: String,
    pub token: String,
}

/// Keyed secret store over the OS keychain (§6): `account` plus one
/// `library:<id>` entry per encrypted-library password. Absent entries
/// return `None`, never an error.
pub struct SecretStore;

impl SecretStore {
    pub fn new() -> Self {
        SecretStore
    }

    fn entry(key: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, key)
            .map_err(|e| CoreError::Storage(StorageError::SecretStore(e.to_string())))
    }

    fn library_key(library_id: &str) -> String {
        format!("library:{library_id}")
    }

    fn get_raw(key: &str) -> Result<Option<String>> {
        let entry = Self::entry(key)?;
        match entry.get_password() {
            Ok(v) => Ok(Some(v)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CoreError::Storage(StorageError::SecretStore(e.to_string()))),
        }
    }

    fn put_raw(key: &str, value: &str) -> Result<()> {
        Self::entry(key)?
            .set_password(value)
            .map_err(|e| CoreError::Storage(StorageError::SecretStore(e.to_string())))
    }

    fn delete_raw(key: &str) -> Result<()> {
        match Self::entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CoreError::Storage(StorageError::SecretStore(e.to_string()))),
        }
    }

    pub fn load_account(&self) -> Result<Option<Account>> {
        match Self::get_raw(ACCOUNT_KEY)? {
            Some(json) => {
                let account = serde_json::from_str(&json).map_err(|e| {
                    CoreError::Storage(StorageError::SecretStore(format!(
                        "parse account: {e}"
                    )))
                })?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    pub fn save_account(&self, account: &Account) -> Result<()> {
        let json = serde_json::to_string(account).map_err(|e| {
            CoreError::Storage(StorageError::SecretStore(format!(
                "serialize account: {e}"
            )))
        })?;
        Self::put_raw(ACCOUNT_KEY, &json)
    }

    pub fn delete_account(&self) -> Result<()> {
        Self::delete_raw(ACCOUNT_KEY)
    }

    pub fn load_library_password(&self, library_id: &str) -> Result<Option<String>> {
        Self::get_raw(&Self::library_key(library_id))
    }

    pub fn save_library_password(&self, library_id: &str, password: &str) -> Result<()> {
        Self::put_raw(&Self::library_key(library_id), password)
    }

    pub fn delete_library_password(&self, library_id: &str) -> Result<()> {
        Self::delete_raw(&Self::library_key(library_id))
    }
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new()
    }
}
