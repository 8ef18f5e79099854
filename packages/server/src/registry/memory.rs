use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{KeyValueStore, RegistryError};

#[derive(Debug, Clone)]
struct Value {
    data: String,
    expires_at: Option<Instant>,
}

impl Value {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// In-process key-value store with the same semantics as [`super::RedisKv`],
/// including key expiry.
#[derive(Default)]
pub struct MemoryKv {
    values: DashMap<String, Value>,
    sets: DashMap<String, BTreeSet<String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError> {
        Ok(self
            .values
            .get(key)
            .filter(|v| v.is_live())
            .map(|v| v.data.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        self.values.insert(
            key.to_string(),
            Value {
                data: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, RegistryError> {
        let new = Value {
            data: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        match self.values.entry(key.to_string()) {
            Entry::Occupied(mut existing) if !existing.get().is_live() => {
                existing.insert(new);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(new);
                Ok(true)
            }
        }
    }

    async fn set_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        self.values.insert(
            key.to_string(),
            Value {
                data: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, RegistryError> {
        Ok(self
            .values
            .remove_if(key, |_, v| v.is_live() && v.data == expected)
            .is_some())
    }

    async fn add_member(&self, set: &str, member: &str) -> Result<(), RegistryError> {
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn remove_member(&self, set: &str, member: &str) -> Result<(), RegistryError> {
        if let Some(mut members) = self.sets.get_mut(set) {
            members.remove(member);
        }
        Ok(())
    }

    async fn members(&self, set: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_only_writes_absent_keys() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "a", None).await.unwrap());
        assert!(!kv.set_nx("k", "b", None).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn expired_keys_are_invisible_and_reclaimable() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("lock", "a", Some(Duration::from_millis(10))).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(kv.get("lock").await.unwrap().is_none());
        assert!(kv.set_nx("lock", "b", Some(Duration::from_secs(5))).await.unwrap());
    }

    #[tokio::test]
    async fn set_expiring_overwrites_and_expires() {
        let kv = MemoryKv::new();
        kv.set("k", "a").await.unwrap();
        kv.set_expiring("k", "b", Duration::from_millis(10)).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("b"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_if_eq_compares_value() {
        let kv = MemoryKv::new();
        kv.set("k", "token").await.unwrap();
        assert!(!kv.delete_if_eq("k", "other").await.unwrap());
        assert!(kv.delete_if_eq("k", "token").await.unwrap());
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_members_round_trip() {
        let kv = MemoryKv::new();
        kv.add_member("s", "b").await.unwrap();
        kv.add_member("s", "a").await.unwrap();
        kv.add_member("s", "a").await.unwrap();
        assert_eq!(kv.members("s").await.unwrap(), vec!["a", "b"]);
        kv.remove_member("s", "a").await.unwrap();
        assert_eq!(kv.members("s").await.unwrap(), vec!["b"]);
        assert!(kv.members("missing").await.unwrap().is_empty());
    }
}
