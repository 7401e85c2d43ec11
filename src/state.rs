use std::sync::Arc;

use anyhow::Context;

use crate::{
    auth::IdentityEvents,
    config::{AppConfig, JwtConfig, LedgerConfig, MediaConfig, StoreBackend},
    db::Db,
    media::{MemoryObjectStorage, ObjectStorage, S3Storage},
    store::{DocumentStore, MemoryStore, PgDocumentStore},
};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub identity: IdentityEvents,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store: Arc<dyn DocumentStore> = match config.backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connect to postgres")?;
                let pg = PgDocumentStore::new(pool);
                pg.migrate().await?;
                Arc::new(pg)
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory document store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let storage = Arc::new(S3Storage::connect(&config.media).await?) as Arc<dyn ObjectStorage>;

        Ok(Self::from_parts(
            Db::new(store, config.ledger.retry_policy()),
            config,
            storage,
        ))
    }

    pub fn from_parts(db: Db, config: Arc<AppConfig>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            db,
            config,
            storage,
            identity: IdentityEvents::new(),
        }
    }

    /// In-memory wiring for tests.
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            backend: StoreBackend::Memory,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
                verify_ttl_minutes: 60,
            },
            media: MediaConfig {
                endpoint: "fake".into(),
                bucket: "fake".into(),
                access_key: "fake".into(),
                secret_key: "fake".into(),
                region: "us-east-1".into(),
                presign_ttl_secs: 60,
            },
            ledger: LedgerConfig {
                max_write_attempts: 8,
                read_retry_attempts: 3,
                read_retry_base_ms: 1,
            },
        });
        let db = Db::new(Arc::new(MemoryStore::new()), config.ledger.retry_policy());
        let storage = Arc::new(MemoryObjectStorage::new()) as Arc<dyn ObjectStorage>;
        Self::from_parts(db, config, storage)
    }
}
