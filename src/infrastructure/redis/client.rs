use redis::{aio::MultiplexedConnection, Client};
use tracing::info;

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let service = Self::open(connection_string)?;

        // Test connection
        let _conn = service.get_conn().await?;

        info!("✅ Connected to Redis");
        Ok(service)
    }

    /// Client without an eager round-trip; connections are made on demand.
    pub fn open(connection_string: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: Client::open(connection_string)?,
        })
    }

    pub async fn get_conn(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}
