//! Durable state kept in the key-value store: projects, per-project leases
//! and the flow journal.

pub mod journal;
pub mod lease;
pub mod memory;
pub mod projects;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use journal::{FlowJournal, FlowOutcome, FlowRecord, FlowResources, FlowStep};
pub use lease::{Lease, LeaseManager};
pub use memory::MemoryKv;
pub use projects::ProjectRegistry;
pub use redis::RedisKv;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The per-project lease could not be acquired in time.
    #[error("project {0} is busy with another operation, retry later")]
    Busy(String),

    #[error("record {key} has unsupported schema version {found}")]
    UnsupportedSchema { key: String, found: u32 },

    #[error("malformed record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key-value store error: {0}")]
    Backend(String),
}

/// The subset of key-value operations the registry relies on. No cross-key
/// atomicity is assumed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RegistryError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), RegistryError>;

    /// Set only if absent, optionally expiring after `ttl`. Returns whether
    /// the value was written.
    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, RegistryError>;

    /// Set, replacing any previous value, and expire after `ttl`.
    async fn set_expiring(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RegistryError>;

    /// Delete only if the current value equals `expected`.
    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, RegistryError>;

    async fn add_member(&self, set: &str, member: &str) -> Result<(), RegistryError>;

    async fn remove_member(&self, set: &str, member: &str) -> Result<(), RegistryError>;

    async fn members(&self, set: &str) -> Result<Vec<String>, RegistryError>;
}

/// Current version of every record this module writes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(serde::Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    data: &'a T,
}

#[derive(serde::Deserialize)]
struct Envelope {
    schema_version: u32,
    data: serde_json::Value,
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, RegistryError> {
    Ok(serde_json::to_string(&EnvelopeRef {
        schema_version: SCHEMA_VERSION,
        data: value,
    })?)
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T, RegistryError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    if envelope.schema_version != SCHEMA_VERSION {
        return Err(RegistryError::UnsupportedSchema {
            key: key.to_string(),
            found: envelope.schema_version,
        });
    }
    Ok(serde_json::from_value(envelope.data)?)
}
