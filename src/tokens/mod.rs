//! Opaque bearer tokens: in-memory index plus per-user disk mirror.
//!
//! The in-memory map is the state of truth during a run; `tokens.json` under
//! each user directory mirrors it so a restart can rehydrate every token by
//! walking the user tree.

pub mod rotation;

use crate::hash::random_token;
use crate::store::{Store, StoreError};
use crate::users;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Access tokens live for one hour, refresh tokens for thirty days.
pub const ACCESS_LIFETIME_SECS: i64 = 60 * 60;
pub const REFRESH_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("token unknown")]
    TokenUnknown,
    #[error("token expired")]
    TokenExpired,
    #[error("token subject missing")]
    SubjectMissing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TokenRecord {
    pub subject: String,
    pub time: DateTime<Utc>,
    pub is_refresh: bool,
}

impl TokenRecord {
    #[must_use]
    pub fn lifetime_secs(&self) -> i64 {
        if self.is_refresh {
            REFRESH_LIFETIME_SECS
        } else {
            ACCESS_LIFETIME_SECS
        }
    }

    #[must_use]
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.time > Duration::seconds(self.lifetime_secs())
    }
}

/// Entry in a user's `tokens.json` document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskToken {
    time: DateTime<Utc>,
    is_refresh: bool,
}

/// Freshly minted access/refresh pair.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expiry: DateTime<Utc>,
    pub refresh_expiry: DateTime<Utc>,
    pub subject: String,
}

pub struct TokenStore {
    store: Store,
    records: RwLock<HashMap<String, TokenRecord>>,
}

impl TokenStore {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Rehydrate the in-memory map by walking every user's `tokens.json`.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let mut records = HashMap::new();
        for (path, is_file) in self.store.walk(users::USERS_PREFIX).await? {
            if !is_file || !path.ends_with("/tokens.json") {
                continue;
            }
            let mut parts = path.rsplit('/');
            parts.next();
            let Some(subject) = parts.next().map(ToString::to_string) else {
                continue;
            };
            let tokens: HashMap<String, DiskToken> = self.store.load_or(&path, HashMap::new()).await?;
            for (token, disk) in tokens {
                records.insert(
                    token,
                    TokenRecord {
                        subject: subject.clone(),
                        time: disk.time,
                        is_refresh: disk.is_refresh,
                    },
                );
            }
        }
        let count = records.len();
        *self.records.write().await = records;
        debug!("Loaded {count} tokens");
        Ok(count)
    }

    /// Mint a new access/refresh pair and persist the subject's mirror.
    pub async fn mint(&self, subject: &str) -> Result<TokenPair, StoreError> {
        let now = Utc::now();
        let pair = TokenPair {
            access_token: random_token(),
            refresh_token: random_token(),
            access_expiry: now + Duration::seconds(ACCESS_LIFETIME_SECS),
            refresh_expiry: now + Duration::seconds(REFRESH_LIFETIME_SECS),
            subject: subject.to_string(),
        };
        {
            let mut records = self.records.write().await;
            records.insert(
                pair.access_token.clone(),
                TokenRecord {
                    subject: subject.to_string(),
                    time: now,
                    is_refresh: false,
                },
            );
            records.insert(
                pair.refresh_token.clone(),
                TokenRecord {
                    subject: subject.to_string(),
                    time: now,
                    is_refresh: true,
                },
            );
        }
        self.persist_user(subject).await?;
        Ok(pair)
    }

    /// Resolve a presented token to its record.
    ///
    /// Expired records are removed from memory and from the subject's disk
    /// mirror before the failure is reported, so the store heals itself.
    pub async fn resolve(&self, token: &str) -> Result<TokenRecord, AuthFailure> {
        let record = {
            let records = self.records.read().await;
            records.get(token).cloned()
        };
        let Some(record) = record else {
            return Err(AuthFailure::TokenUnknown);
        };
        if record.expired_at(Utc::now()) {
            self.records.write().await.remove(token);
            if let Err(err) = self.persist_user(&record.subject).await {
                warn!("Failed to persist token eviction: {err}");
            }
            return Err(AuthFailure::TokenExpired);
        }
        Ok(record)
    }

    /// Resolve a presented token all the way to its user.
    ///
    /// A resolvable token whose subject no longer exists is a
    /// data-integrity signal; it is logged and reported as
    /// [`AuthFailure::SubjectMissing`].
    pub async fn authenticate(
        &self,
        token: &str,
        users: &crate::users::UserDirectory,
    ) -> Result<crate::users::User, AuthFailure> {
        let record = self.resolve(token).await?;
        match users.get(&record.subject).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                tracing::error!("Token subject missing: {}", record.subject);
                Err(AuthFailure::SubjectMissing)
            }
            Err(err) => {
                tracing::error!("Failed to load token subject {}: {err}", record.subject);
                Err(AuthFailure::SubjectMissing)
            }
        }
    }

    /// Remove a single token from memory and its subject's mirror.
    pub async fn remove(&self, token: &str) -> Result<(), StoreError> {
        let removed = self.records.write().await.remove(token);
        if let Some(record) = removed {
            self.persist_user(&record.subject).await?;
        }
        Ok(())
    }

    /// Remove every token belonging to `subject`.
    pub async fn clear_user(&self, subject: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .retain(|_, record| record.subject != subject);
        self.store
            .drop_document(&users::tokens_path(subject))
            .await?;
        Ok(())
    }

    /// Number of tokens currently indexed.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Rewrite one subject's `tokens.json` from the in-memory map.
    async fn persist_user(&self, subject: &str) -> Result<(), StoreError> {
        let snapshot: HashMap<String, DiskToken> = {
            let records = self.records.read().await;
            records
                .iter()
                .filter(|(_, record)| record.subject == subject)
                .map(|(token, record)| {
                    (
                        token.clone(),
                        DiskToken {
                            time: record.time,
                            is_refresh: record.is_refresh,
                        },
                    )
                })
                .collect()
        };
        if snapshot.is_empty() {
            self.store
                .drop_document(&users::tokens_path(subject))
                .await
        } else {
            self.store.save(&users::tokens_path(subject), &snapshot).await
        }
    }
}
