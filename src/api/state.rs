//! Server configuration and shared request state.

use crate::access::AccessEvaluator;
use crate::hash::password_hash;
use crate::ports::PortSpec;
use crate::rate_limit::RateLimiter;
use crate::store::Store;
use crate::tokens::TokenStore;
use crate::tokens::rotation::RotationRegistry;
use crate::users::{User, UserDirectory};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_DATA_DIR: &str = "./auth-data";
pub const DEFAULT_PORT: u16 = 3000;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    data_dir: PathBuf,
    ports: PortSpec,
    max_attempts: u32,
    window: Duration,
    clear_tokens_on_reset: bool,
}

impl ServerConfig {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, ports: PortSpec) -> Self {
        Self {
            data_dir: data_dir.into(),
            ports,
            max_attempts: crate::rate_limit::DEFAULT_MAX_ATTEMPTS,
            window: crate::rate_limit::DEFAULT_WINDOW,
            clear_tokens_on_reset: true,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, max_attempts: u32, window: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_clear_tokens_on_reset(mut self, clear: bool) -> Self {
        self.clear_tokens_on_reset = clear;
        self
    }

    #[must_use]
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    #[must_use]
    pub fn ports(&self) -> &PortSpec {
        &self.ports
    }

    #[must_use]
    pub fn clear_tokens_on_reset(&self) -> bool {
        self.clear_tokens_on_reset
    }
}

/// Authenticated caller, attached as a request extension by the auth
/// middleware when a valid bearer token is presented.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

pub struct AppState {
    pub store: Store,
    pub users: UserDirectory,
    pub tokens: TokenStore,
    pub rotation: RotationRegistry,
    pub limiter: RateLimiter,
    pub access: AccessEvaluator,
    /// Stamped on every response as `X-Server-ID`; bound once per instance.
    pub server_id: String,
    config: ServerConfig,
}

impl AppState {
    /// Build every service over the data root, rehydrate the caches, and
    /// bootstrap the `root` user on first start.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let store = Store::new(config.data_dir());
        let users = UserDirectory::new(store.clone());
        let tokens = TokenStore::new(store.clone());
        let rotation = RotationRegistry::new(store.clone());
        let limiter = RateLimiter::new(config.max_attempts, config.window);
        let access = AccessEvaluator::new(store.clone());

        let loaded = tokens.load().await.context("Failed to load token store")?;
        rotation
            .load()
            .await
            .context("Failed to load rotation registry")?;
        rotation
            .cleanup()
            .await
            .context("Failed to sweep expired rotation nodes")?;
        info!("Token store ready with {loaded} tokens");

        let state = Self {
            store,
            users,
            tokens,
            rotation,
            limiter,
            access,
            server_id: Uuid::new_v4().to_string(),
            config,
        };
        state.bootstrap_root().await?;
        Ok(state)
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// First start with an empty user tree creates a verified `root` admin
    /// with a minted token pair, so the server is administrable out of the
    /// box.
    async fn bootstrap_root(&self) -> Result<()> {
        if !self
            .users
            .is_empty()
            .await
            .context("Failed to scan user tree")?
        {
            return Ok(());
        }
        let mut root = User::new("root", "root@localhost", &password_hash("root"));
        root.verified = true;
        root.roles.insert("admin".to_string());
        self.users
            .save(&root)
            .await
            .context("Failed to persist root user")?;
        let pair = self
            .tokens
            .mint("root")
            .await
            .context("Failed to mint root tokens")?;
        self.rotation
            .register(&pair.refresh_token, "root", None)
            .await
            .context("Failed to register root refresh token")?;
        info!("Bootstrapped user \"root\" with an initial token pair");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn config_defaults_and_overrides() {
        let config = ServerConfig::new("/tmp/data", PortSpec::Single(3000));
        assert!(config.clear_tokens_on_reset());
        assert_eq!(config.ports(), &PortSpec::Single(3000));

        let config = config
            .with_rate_limit(3, Duration::from_millis(500))
            .with_clear_tokens_on_reset(false);
        assert!(!config.clear_tokens_on_reset());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.window, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn first_start_bootstraps_root() {
        let dir = TempDir::new().expect("tempdir");
        let config = ServerConfig::new(dir.path(), PortSpec::Single(0));
        let state = AppState::new(config).await.expect("state");
        let root = state
            .users
            .get("root")
            .await
            .expect("get")
            .expect("root exists");
        assert!(root.verified);
        assert!(root.is_admin());
        assert_eq!(state.tokens.count().await, 2);
        assert_eq!(state.rotation.count().await, 1);
    }

    #[tokio::test]
    async fn restart_does_not_recreate_root() {
        let dir = TempDir::new().expect("tempdir");
        let config = ServerConfig::new(dir.path(), PortSpec::Single(0));
        let first = AppState::new(config.clone()).await.expect("state");
        let root = first.users.get("root").await.expect("get").expect("root");
        drop(first);

        let second = AppState::new(config).await.expect("state");
        let reloaded = second.users.get("root").await.expect("get").expect("root");
        assert_eq!(reloaded.created_at, root.created_at);
        // Tokens from the first run are rehydrated, not re-minted.
        assert_eq!(second.tokens.count().await, 2);
        assert_eq!(second.rotation.count().await, 1);
    }

    #[tokio::test]
    async fn server_ids_are_per_instance() {
        let dir = TempDir::new().expect("tempdir");
        let config = ServerConfig::new(dir.path(), PortSpec::Single(0));
        let first = AppState::new(config.clone()).await.expect("state");
        let second = AppState::new(config).await.expect("state");
        assert_ne!(first.server_id, second.server_id);
    }
}
