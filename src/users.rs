//! User records and the sharded on-disk user directory.
//!
//! A user named `alice` lives under `users/al/ic/alice/`; the two shard
//! levels keep any single directory's fanout bounded. Each user directory
//! holds `info.json` (the record below), `tokens.json` (owned by the token
//! store), and an optional `access.txt` consumed by the access evaluator.

use crate::store::{Store, StoreError};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub const USERS_PREFIX: &str = "users";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid username: {0}")]
    InvalidName(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_code: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh unverified user with a hashed password and no roles.
    #[must_use]
    pub fn new(name: &str, email: &str, password_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            verified: false,
            verification_code: None,
            reset_code: None,
            roles: BTreeSet::new(),
            is_public: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }
}

/// Username pattern accepted by signup and save.
#[must_use]
pub fn valid_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{3,32}$").is_ok_and(|regex| regex.is_match(name))
}

/// Sharded directory for a username, e.g. `users/al/ic/alice`.
///
/// Names are at least three characters, so the second shard may be a single
/// character.
#[must_use]
pub fn shard_dir(name: &str) -> String {
    let first = &name[..2.min(name.len())];
    let second = &name[2.min(name.len())..4.min(name.len())];
    format!("{USERS_PREFIX}/{first}/{second}/{name}")
}

#[must_use]
pub fn info_path(name: &str) -> String {
    format!("{}/info.json", shard_dir(name))
}

#[must_use]
pub fn tokens_path(name: &str) -> String {
    format!("{}/tokens.json", shard_dir(name))
}

#[must_use]
pub fn access_path(name: &str) -> String {
    format!("{}/access.txt", shard_dir(name))
}

pub struct UserDirectory {
    store: Store,
    // Per-user serialisation for compound read-modify-write sequences; the
    // store itself only guarantees per-file atomicity.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserDirectory {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock guarding compound operations on one user's documents.
    pub async fn lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load a user record; an invalid or unknown name yields `None`.
    pub async fn get(&self, name: &str) -> Result<Option<User>, StoreError> {
        if !valid_name(name) {
            return Ok(None);
        }
        match self.store.load::<User>(&info_path(name)).await {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Validate the name pattern and persist `info.json`.
    pub async fn save(&self, user: &User) -> Result<(), DirectoryError> {
        if !valid_name(&user.name) {
            return Err(DirectoryError::InvalidName(user.name.clone()));
        }
        self.store.save(&info_path(&user.name), user).await?;
        Ok(())
    }

    /// Remove every document under the user's directory.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.store.drop_document(&info_path(name)).await?;
        self.store.drop_document(&tokens_path(name)).await?;
        self.store.drop_document(&access_path(name)).await?;
        Ok(())
    }

    /// Sorted usernames, enumerated by scanning `info.json` files.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for (path, is_file) in self.store.walk(USERS_PREFIX).await? {
            if !is_file || !path.ends_with("/info.json") {
                continue;
            }
            let mut parts = path.rsplit('/');
            parts.next();
            if let Some(name) = parts.next() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// True when at least one user record exists.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.list().await?.is_empty())
    }
}
