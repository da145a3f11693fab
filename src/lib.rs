//! User accounts, personal profiles and their administration.
//!
//! Users are created through [`user::UserManager`], edited through the
//! [`forms`] and administered with the JSON [`admin::router`].

#![forbid(unsafe_code)]

pub mod admin;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod forms;
pub mod media;
pub mod profile;
pub mod telemetry;
pub mod user;

use std::sync::Arc;

use config::Configuration;
use crypto::PasswordManager;
use database::Database;
use database::memory::{MemoryProfileRepository, MemoryUserRepository};
use database::postgres::{PgProfileRepository, PgUserRepository};
use error::{AccountError, Result};
use media::MediaStorage;
use profile::ProfileRepository;
use user::{UserManager, UserRepository};

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub users: Arc<dyn UserRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub crypto: Arc<PasswordManager>,
    pub media: Arc<MediaStorage>,
    pub manager: UserManager,
}

impl AppState {
    /// Assemble the state around the given repositories.
    pub fn new(
        config: Arc<Configuration>,
        users: Arc<dyn UserRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Result<Self> {
        let crypto = Arc::new(PasswordManager::new(config.argon2.clone())?);
        let manager = UserManager::new(
            Arc::clone(&users),
            Arc::clone(&crypto),
            config.media.default_profile_image.clone(),
        );

        Ok(Self {
            media: Arc::new(MediaStorage::new(config.media.clone())),
            config,
            users,
            profiles,
            crypto,
            manager,
        })
    }

    /// State backed by the in-memory adapter.
    pub fn in_memory(config: Arc<Configuration>) -> Result<Self> {
        Self::new(
            config,
            Arc::new(MemoryUserRepository::default()),
            Arc::new(MemoryProfileRepository::default()),
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("media", &self.media)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

/// Connect to PostgreSQL, apply migrations and build the state.
pub async fn initialize_state(config: Arc<Configuration>) -> Result<AppState> {
    let Some(postgres) = &config.postgres else {
        tracing::error!("missing `postgres` entry on `config.yaml` file");
        return Err(AccountError::Internal {
            details: "missing `postgres` configuration".into(),
        });
    };

    let db = Database::from_config(postgres).await?;
    db.migrate().await?;

    AppState::new(
        Arc::clone(&config),
        Arc::new(PgUserRepository::new(db.postgres.clone())),
        Arc::new(PgProfileRepository::new(db.postgres)),
    )
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub(crate) fn memory_state(media_root: &std::path::Path) -> AppState {
    let mut config = Configuration::default();
    config.argon2 = Some(config::Argon2 {
        memory_cost: 64,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    });
    config.media.root = media_root.to_path_buf();

    AppState::in_memory(Arc::new(config)).expect("valid test state")
}
