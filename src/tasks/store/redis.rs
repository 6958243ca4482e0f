//! Redis snapshot store using a bb8 connection pool.

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};

use crate::config::settings::RedisStoreConfig;
use crate::tasks::model::BatchTask;
use crate::tasks::store::{StoreError, TaskStore};

type RedisPool = Pool<Client>;

/// All snapshots live in one hash, `{prefix}:tasks`, keyed by task id.
pub struct RedisTaskStore {
    pool: RedisPool,
    hash_key: String,
}

impl RedisTaskStore {
    pub async fn new(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(std::time::Duration::from_secs(config.connection_timeout))
            .build(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            hash_key: format!("{}:tasks", config.key_prefix),
        })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, Client>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn save(&self, task: &BatchTask) -> Result<(), StoreError> {
        let value = serde_json::to_string(task)?;
        let mut conn = self.get_conn().await?;

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .hset::<_, _, _, ()>(&self.hash_key, &task.task_id, value)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    async fn load_all(&self) -> Result<Vec<BatchTask>, StoreError> {
        let mut conn = self.get_conn().await?;

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let values: Vec<String> = conn_ref
            .hvals(&self.hash_key)
            .await
            .map_err(|e: RedisError| StoreError::Operation(e.to_string()))?;

        let mut tasks = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_str::<BatchTask>(&value) {
                Ok(task) => tasks.push(task),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable task snapshot"),
            }
        }
        Ok(tasks)
    }

    async fn remove(&self, task_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_conn().await?;

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .hdel::<_, _, ()>(&self.hash_key, task_id)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
