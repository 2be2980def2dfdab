use std::sync::Arc;

use crate::config::AppConfig;
use crate::db;
use crate::storage::{Ephemeral, PictureStorage, Storage};
use crate::users::repo::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub pictures: Arc<dyn PictureStorage>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = db::connect_store(&config).await?;
        store.ensure_schema().await?;

        let pictures: Arc<dyn PictureStorage> = match &config.s3 {
            Some(s3) => Arc::new(Storage::new(s3).await?),
            None => {
                tracing::warn!("no S3 configuration, profile pictures are not persisted");
                Arc::new(Ephemeral)
            }
        };

        Ok(Self {
            store,
            pictures,
            config,
        })
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        pictures: Arc<dyn PictureStorage>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            pictures,
            config,
        }
    }
}
