use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::auth::credentials::{Argon2Jwt, Credentials, JwtKeys};
use crate::auth::repo::{PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::storage::{MediaUploader, Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub media: MediaUploader,
    pub credentials: Arc<dyn Credentials>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        info!("database connected");

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("create upload dir {}", config.upload_dir.display()))?;

        let storage = Arc::new(Storage::new(&config.media).await?) as Arc<dyn StorageClient>;
        let credentials = Arc::new(Argon2Jwt::new(JwtKeys::from(&config.jwt)));

        Ok(Self::from_parts(
            Arc::new(PgUserStore::new(db)),
            storage,
            credentials,
            config,
        ))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
        credentials: Arc<dyn Credentials>,
        config: Arc<AppConfig>,
    ) -> Self {
        let media = MediaUploader::new(storage, config.media.folder.clone());
        Self {
            users,
            media,
            credentials,
            config,
        }
    }
}
