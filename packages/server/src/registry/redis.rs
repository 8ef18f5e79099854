use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use super::{KeyValueStore, RegistryError};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed key-value store over a multiplexed connection.
#[derive(Clone)]
pub struct RedisKv {
    conn: MultiplexedConnection,
    compare_and_delete: Script,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        Ok(Self {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        })
    }
}

fn backend(err: redis::RedisError) -> RegistryError {
    RegistryError::Backend(err.to_string())
}

#[async_trait]
impl KeyValueStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(backend)
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, RegistryError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn set_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, RegistryError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(deleted == 1)
    }

    async fn add_member(&self, set: &str, member: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(set, member).await.map_err(backend)
    }

    async fn remove_member(&self, set: &str, member: &str) -> Result<(), RegistryError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(set, member).await.map_err(backend)
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, RegistryError> {
        let mut conn = self.conn.clone();
        conn.smembers(set).await.map_err(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testcontainers::ContainerAsync;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::Redis;

    /// The container must outlive the connection, so both are returned.
    async fn redis_kv() -> (ContainerAsync<Redis>, RedisKv) {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");
        let kv = RedisKv::connect(&format!("redis://127.0.0.1:{port}"))
            .await
            .expect("Failed to connect to Redis");
        (container, kv)
    }

    #[tokio::test]
    async fn set_nx_respects_existing_keys_and_ttl() {
        let (_redis, kv) = redis_kv().await;

        assert!(kv.set_nx("lease", "a", Some(Duration::from_millis(200))).await.unwrap());
        assert!(!kv.set_nx("lease", "b", None).await.unwrap());
        assert_eq!(kv.get("lease").await.unwrap().as_deref(), Some("a"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(kv.get("lease").await.unwrap().is_none());
        assert!(kv.set_nx("lease", "b", None).await.unwrap());
        assert_eq!(kv.get("lease").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn delete_if_eq_only_removes_matching_value() {
        let (_redis, kv) = redis_kv().await;
        kv.set("lease", "token-1").await.unwrap();

        assert!(!kv.delete_if_eq("lease", "token-2").await.unwrap());
        assert_eq!(kv.get("lease").await.unwrap().as_deref(), Some("token-1"));
        assert!(kv.delete_if_eq("lease", "token-1").await.unwrap());
        assert!(kv.get("lease").await.unwrap().is_none());
        assert!(!kv.delete_if_eq("lease", "token-1").await.unwrap());
    }

    #[tokio::test]
    async fn set_expiring_replaces_then_expires() {
        let (_redis, kv) = redis_kv().await;
        kv.set("flow", "running").await.unwrap();
        kv.set_expiring("flow", "done", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(kv.get("flow").await.unwrap().as_deref(), Some("done"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(kv.get("flow").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_membership() {
        let (_redis, kv) = redis_kv().await;
        assert!(kv.members("flows").await.unwrap().is_empty());

        kv.add_member("flows", "b").await.unwrap();
        kv.add_member("flows", "a").await.unwrap();
        kv.add_member("flows", "a").await.unwrap();
        let mut members = kv.members("flows").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        kv.remove_member("flows", "a").await.unwrap();
        kv.remove_member("flows", "missing").await.unwrap();
        assert_eq!(kv.members("flows").await.unwrap(), vec!["b".to_string()]);
    }
}
