use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AppConfig, StoreBackend};
use crate::interviews::services::InterviewWorkflow;
use crate::sequence::{EntityFactory, MemorySequences, PgSequences, SequenceAllocator};
use crate::storage::{Storage, StorageClient};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub factory: EntityFactory,
    pub workflow: InterviewWorkflow,
    /// None when blob storage is not configured.
    pub storage: Option<Arc<dyn StorageClient>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, sequences): (Arc<dyn Store>, Arc<dyn SequenceAllocator>) = match config.backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
                    .await?;

                sqlx::migrate!("./migrations").run(&db).await?;
                info!("migrations applied");
                (
                    Arc::new(PgStore::new(db.clone())) as Arc<dyn Store>,
                    Arc::new(PgSequences::new(db)) as Arc<dyn SequenceAllocator>,
                )
            }
            StoreBackend::Memory => {
                warn!("using in-memory store; data is lost on restart");
                (
                    Arc::new(MemoryStore::new()) as Arc<dyn Store>,
                    Arc::new(MemorySequences::new()) as Arc<dyn SequenceAllocator>,
                )
            }
        };

        let storage = match &config.s3 {
            Some(s3) => Some(Arc::new(Storage::new(s3).await?) as Arc<dyn StorageClient>),
            None => {
                info!("S3 not configured; file uploads disabled");
                None
            }
        };

        Ok(Self::from_parts(config, store, sequences, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn Store>,
        sequences: Arc<dyn SequenceAllocator>,
        storage: Option<Arc<dyn StorageClient>>,
    ) -> Self {
        let factory = EntityFactory::new(sequences);
        let workflow = InterviewWorkflow::new(store.clone(), factory.clone());
        Self {
            config,
            store,
            factory,
            workflow,
            storage,
        }
    }

    /// Memory-backed state with a recording blob store.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySequences::new()),
            Some(Arc::new(fake::FakeStorage::default()) as Arc<dyn StorageClient>),
        )
    }
}
