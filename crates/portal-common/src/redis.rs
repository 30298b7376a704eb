/// Redis key/value wrapper with graceful degradation.
///
/// Every key is namespaced with the store's prefix. On any Redis error the
/// operation logs a warning and reports nothing stored; the portal works
/// without Redis.
use redis::AsyncCommands;
use tracing::warn;

#[derive(Clone)]
pub struct RedisStore {
    client: Option<redis::Client>,
    prefix: String,
}

impl RedisStore {
    /// If the URL is `None` or invalid, every operation is a no-op.
    pub fn new(url: Option<&str>, prefix: &str) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, url = u, "failed to create redis client, persistence disabled"))
                .ok()
        });
        Self {
            client,
            prefix: prefix.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Sends a PING. Returns `true` if Redis is reachable.
    pub async fn is_available(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                result.is_ok()
            }
            Err(_) => false,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
            .ok()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        let key = self.key(key);
        let value: Option<String> = conn
            .get(&key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis GET failed"))
            .ok()?;
        value
    }

    /// Returns `true` if the value was written.
    pub async fn set(&self, key: &str, value: &str) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        let key = self.key(key);
        conn.set::<_, _, ()>(&key, value)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SET failed"))
            .is_ok()
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        let key = self.key(key);
        conn.del::<_, ()>(&key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis DEL failed"))
            .is_ok()
    }
}
