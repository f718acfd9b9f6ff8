//! Refresh-token rotation chains.
//!
//! Each minted refresh token records the token it replaced, forming a
//! per-user singly-linked chain. Invalidating any node cascades through its
//! predecessors, so a stolen token that falls back to an older ancestor
//! finds it already revoked.

use crate::store::{Store, StoreError};
use crate::tokens::REFRESH_LIFETIME_SECS;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Snapshot document under the data root.
pub const REGISTRY_PATH: &str = ".token-rotation-registry";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationNode {
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub previous_token: Option<String>,
}

impl RotationNode {
    fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(REFRESH_LIFETIME_SECS)
    }
}

pub struct RotationRegistry {
    store: Store,
    // The lock also serialises snapshot writers; the snapshot is always
    // written whole.
    nodes: Mutex<HashMap<String, RotationNode>>,
}

impl RotationRegistry {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Rehydrate the registry from its snapshot document.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let nodes: HashMap<String, RotationNode> =
            self.store.load_or(REGISTRY_PATH, HashMap::new()).await?;
        let count = nodes.len();
        *self.nodes.lock().await = nodes;
        debug!("Loaded {count} rotation nodes");
        Ok(count)
    }

    /// Record a refresh token, optionally chained to its predecessor.
    pub async fn register(
        &self,
        token: &str,
        subject: &str,
        previous: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut nodes = self.nodes.lock().await;
        nodes.insert(
            token.to_string(),
            RotationNode {
                username: subject.to_string(),
                created_at: Utc::now(),
                previous_token: previous.map(ToString::to_string),
            },
        );
        self.persist(&nodes).await
    }

    /// True when the token is registered to `subject` and not expired.
    ///
    /// An expired node is removed on observation.
    pub async fn validate(&self, token: &str, subject: &str) -> Result<bool, StoreError> {
        let mut nodes = self.nodes.lock().await;
        let Some(node) = nodes.get(token) else {
            return Ok(false);
        };
        if node.expired_at(Utc::now()) {
            nodes.remove(token);
            self.persist(&nodes).await?;
            return Ok(false);
        }
        Ok(node.username == subject)
    }

    /// Remove the token and cascade through its predecessor chain.
    ///
    /// Invalidating an already-absent token is a no-op.
    pub async fn invalidate(&self, token: &str) -> Result<(), StoreError> {
        let mut nodes = self.nodes.lock().await;
        let mut cursor = Some(token.to_string());
        let mut removed = false;
        while let Some(current) = cursor {
            match nodes.remove(&current) {
                Some(node) => {
                    removed = true;
                    cursor = node.previous_token;
                }
                None => break,
            }
        }
        if removed {
            self.persist(&nodes).await?;
        }
        Ok(())
    }

    /// Remove every node registered to `subject`.
    pub async fn clear_user(&self, subject: &str) -> Result<(), StoreError> {
        let mut nodes = self.nodes.lock().await;
        let before = nodes.len();
        nodes.retain(|_, node| node.username != subject);
        if nodes.len() != before {
            self.persist(&nodes).await?;
        }
        Ok(())
    }

    /// Sweep expired nodes.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut nodes = self.nodes.lock().await;
        let before = nodes.len();
        nodes.retain(|_, node| !node.expired_at(now));
        let swept = before - nodes.len();
        if swept > 0 {
            self.persist(&nodes).await?;
        }
        Ok(swept)
    }

    /// Number of live nodes.
    pub async fn count(&self) -> usize {
        self.nodes.lock().await.len()
    }

    async fn persist(&self, nodes: &HashMap<String, RotationNode>) -> Result<(), StoreError> {
        self.store.save(REGISTRY_PATH, nodes).await
    }
}
