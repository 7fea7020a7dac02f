use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool as create_db_pool, run_migrations};
use crate::redis::{create_pool as create_redis_pool, RedisPool};
use crate::store::{PgStore, ReminderStore};

#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn ReminderStore>,
    pub redis_pool: Option<RedisPool>,
}

impl WorkerContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        if config.database.run_migrations {
            run_migrations(&config.database).await?;
        }

        let db_pool = create_db_pool(&config.database).await?;
        let redis_pool = match &config.redis {
            Some(redis) => Some(create_redis_pool(redis).await?),
            None => {
                tracing::info!("REDIS_URL not set, cycle lease disabled");
                None
            }
        };

        Ok(WorkerContext {
            config: Arc::new(config),
            store: Arc::new(PgStore::new(db_pool)),
            redis_pool,
        })
    }
}
