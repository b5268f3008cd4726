use redis::Client as RedisClient;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Read-through cache for public profile responses.
///
/// Every Redis failure is logged and treated as a miss; the database stays
/// the source of truth.
#[derive(Clone)]
pub struct ProfileCache {
    client: RedisClient,
    ttl_seconds: u64,
}

pub fn profile_key(user_id: Uuid) -> String {
    format!("tradelink:profile:{user_id}")
}

impl ProfileCache {
    pub fn new(client: RedisClient, ttl_seconds: u64) -> Self {
        Self {
            client,
            ttl_seconds,
        }
    }

    pub async fn get(&self, user_id: Uuid) -> Option<Value> {
        let key = profile_key(user_id);
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Profile cache unavailable: {e}");
                return None;
            }
        };
        let raw: Option<String> = match redis::cmd("GET").arg(&key).query_async(&mut conn).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Profile cache read failed for {key}: {e}");
                return None;
            }
        };
        let value = raw.and_then(|s| serde_json::from_str(&s).ok());
        debug!("Profile cache {} for {key}", if value.is_some() { "hit" } else { "miss" });
        value
    }

    pub async fn put(&self, user_id: Uuid, value: &Value) {
        let key = profile_key(user_id);
        let result = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            redis::cmd("SET")
                .arg(&key)
                .arg(value.to_string())
                .arg("EX")
                .arg(self.ttl_seconds)
                .query_async::<_, ()>(&mut conn)
                .await
        }
        .await;
        if let Err(e) = result {
            warn!("Profile cache write failed for {key}: {e}");
        }
    }

    pub async fn invalidate(&self, user_id: Uuid) {
        let key = profile_key(user_id);
        let result = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<_, ()>(&mut conn)
                .await
        }
        .await;
        if let Err(e) = result {
            warn!("Profile cache invalidation failed for {key}: {e}");
        }
    }
}
