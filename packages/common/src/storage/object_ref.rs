use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StorageError;

pub const SCHEME: &str = "s3://";

/// A `bucket` + `key` pair addressing one object.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    bucket: String,
    key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, StorageError> {
        let bucket = bucket.into();
        let key = key.into();
        validate_bucket(&bucket)?;
        validate_key(&key)?;
        Ok(Self { bucket, key })
    }

    /// Parse an `s3://bucket/key` reference.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| StorageError::InvalidReference(format!("expected {SCHEME} prefix: {s}")))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| StorageError::InvalidReference(format!("missing object key: {s}")))?;
        Self::new(bucket, key)
    }

    /// Deterministic key for a captured backup:
    /// `{owner}/{project_id}/{timestamp}.{ext}`.
    pub fn backup_key(owner: &str, project_id: &str, at: DateTime<Utc>, ext: &str) -> String {
        format!("{owner}/{project_id}/{}.{ext}", backup_timestamp(at))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Final path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Compact UTC timestamp used in backup keys and staging file names.
pub fn backup_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if bucket.len() < 3 || bucket.len() > 63 || !valid_chars {
        return Err(StorageError::InvalidReference(format!(
            "invalid bucket name: '{bucket}'"
        )));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.ends_with('/') {
        return Err(StorageError::InvalidReference(format!(
            "object key must name a file: '{key}'"
        )));
    }
    if key.starts_with('/') || key.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(StorageError::InvalidReference(format!(
            "object key contains empty or parent segments: '{key}'"
        )));
    }
    Ok(())
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({self})")
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
