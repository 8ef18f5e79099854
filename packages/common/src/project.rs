use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::engine::EngineType;

/// Default credentials injected into every instance of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub database_name: String,
}

/// A tenant project: the unit that owns database instances and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Derived from `(owner, name)`, see [`crate::names::derive_project_id`].
    pub id: String,
    pub owner: String,
    pub name: String,
    pub engine_type: EngineType,
    pub engine_version: String,
    /// Backup artifact a project's first instance is restored from.
    pub backup_location: Option<String>,
    pub default_credentials: Credentials,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Image used for every instance of the project.
    pub fn image(&self) -> String {
        self.engine_type.image(&self.engine_version)
    }
}

/// Generate a random alphanumeric password.
pub fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let password = generate_password(24);
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(password, generate_password(24));
    }

    #[test]
    fn project_serializes_in_camel_case() {
        let project = Project {
            id: "acme-shop".into(),
            owner: "acme".into(),
            name: "shop".into(),
            engine_type: EngineType::Postgres,
            engine_version: "16".into(),
            backup_location: None,
            default_credentials: Credentials {
                username: "devdb".into(),
                password: "pw".into(),
                database_name: "shop".into(),
            },
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&project).unwrap();
        assert_eq!(value["engineType"], "postgres");
        assert_eq!(value["defaultCredentials"]["databaseName"], "shop");
        assert_eq!(project.image(), "postgres:16");
    }
}
