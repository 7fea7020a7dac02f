use anyhow::{anyhow, Result};
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::config::RedisConfig;

pub type RedisPool = Arc<Client>;
pub type RedisConnection = MultiplexedConnection;

// Deletes the lease only while it still carries our holder id.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub async fn create_pool(config: &RedisConfig) -> Result<RedisPool> {
    tracing::info!("Setting up Redis client");
    tracing::info!("Redis URL: {}", mask_redis_url(&config.url));

    let client = Client::open(config.url.as_str())
        .map_err(|e| anyhow!("Failed to create Redis client: {}", e))?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| anyhow!("Failed to connect to Redis: {}", e))?;

    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| anyhow!("Failed to ping Redis: {}", e))?;

    tracing::info!("Redis connection established");

    Ok(Arc::new(client))
}

pub async fn get_connection(pool: &RedisPool) -> Result<RedisConnection> {
    pool.get_multiplexed_async_connection()
        .await
        .map_err(|e| anyhow!("Failed to get Redis connection: {}", e))
}

/// A time-bounded lease that keeps dispatch cycles of several worker
/// replicas from overlapping.
#[derive(Debug)]
pub struct CycleLease {
    pool: RedisPool,
    key: String,
    holder: String,
}

impl CycleLease {
    /// Returns `None` when another holder owns the lease.
    pub async fn acquire(pool: &RedisPool, key: &str, ttl: Duration) -> Result<Option<CycleLease>> {
        let mut conn = get_connection(pool).await?;
        let holder = uuid::Uuid::new_v4().to_string();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to acquire cycle lease {}: {}", key, e))?;

        Ok(reply.map(|_| CycleLease {
            pool: pool.clone(),
            key: key.to_string(),
            holder,
        }))
    }

    pub async fn release(self) -> Result<()> {
        let mut conn = get_connection(&self.pool).await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.holder)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to release cycle lease {}: {}", self.key, e))?;

        if deleted == 0 {
            tracing::warn!("Cycle lease {} expired before release", self.key);
        }
        Ok(())
    }
}

fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        let (before_at, after_at) = url.split_at(at_pos);
        if let Some(colon_pos) = before_at.rfind(':') {
            let (protocol_user, _password) = before_at.split_at(colon_pos);
            format!("{}:****{}", protocol_user, after_at)
        } else {
            format!("redis://****{}", after_at)
        }
    } else {
        url.to_string()
    }
}
