use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database engine backing a project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Postgres,
    Mysql,
}

/// Directory the official engine images scan for init scripts on first boot.
pub const INIT_SCRIPTS_DIR: &str = "/docker-entrypoint-initdb.d";

impl EngineType {
    pub const ALL: &'static [EngineType] = &[Self::Postgres, Self::Mysql];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    /// Engine versions this service knows how to launch.
    pub fn supported_versions(&self) -> &'static [&'static str] {
        match self {
            Self::Postgres => &["13", "14", "15", "16", "17"],
            Self::Mysql => &["5.7", "8.0", "8.4"],
        }
    }

    pub fn is_supported_version(&self, version: &str) -> bool {
        self.supported_versions().contains(&version)
    }

    /// Container image for the given engine version.
    pub fn image(&self, version: &str) -> String {
        format!("{}:{}", self.as_str(), version)
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
        }
    }

    /// Where the engine keeps its data directory inside the container.
    pub fn data_mount_path(&self) -> &'static str {
        match self {
            Self::Postgres => "/var/lib/postgresql/data",
            Self::Mysql => "/var/lib/mysql",
        }
    }

    /// Subdirectory of the volume the data directory is mounted from.
    ///
    /// Both engines refuse to initialise a non-empty directory, and freshly
    /// formatted block volumes carry a `lost+found` entry at their root.
    pub fn data_sub_path(&self) -> &'static str {
        match self {
            Self::Postgres => "pgdata",
            Self::Mysql => "mysql",
        }
    }

    /// Environment consumed by the official image entrypoint to bootstrap
    /// the database, the application user and the superuser.
    pub fn bootstrap_env(&self, username: &str, password: &str, database: &str) -> Vec<(String, String)> {
        let mut pairs: Vec<(&str, &str)> = match self {
            Self::Postgres => vec![
                ("POSTGRES_DB", database),
                ("POSTGRES_USER", username),
                ("POSTGRES_PASSWORD", password),
            ],
            Self::Mysql => vec![
                ("MYSQL_DATABASE", database),
                ("MYSQL_ROOT_PASSWORD", password),
            ],
        };
        // The mysql image rejects MYSQL_USER=root; root is configured above.
        if *self == Self::Mysql && username != "root" {
            pairs.push(("MYSQL_USER", username));
            pairs.push(("MYSQL_PASSWORD", password));
        }
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// File extension of the engine-native dump produced by backups.
    pub fn dump_extension(&self) -> &'static str {
        match self {
            Self::Postgres => "dump",
            Self::Mysql => "sql",
        }
    }

    pub fn dump_content_type(&self) -> &'static str {
        match self {
            Self::Postgres => "application/octet-stream",
            Self::Mysql => "application/sql",
        }
    }

    /// Name of the dump utility invoked by the capture pipeline.
    pub fn dump_program(&self) -> &'static str {
        match self {
            Self::Postgres => "pg_dump",
            Self::Mysql => "mysqldump",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            other => Err(format!(
                "unknown engine type '{other}', expected one of: postgres, mysql"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_names_case_insensitively() {
        assert_eq!("Postgres".parse::<EngineType>().unwrap(), EngineType::Postgres);
        assert_eq!("postgresql".parse::<EngineType>().unwrap(), EngineType::Postgres);
        assert_eq!("MYSQL".parse::<EngineType>().unwrap(), EngineType::Mysql);
        assert!("oracle".parse::<EngineType>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EngineType::Mysql).unwrap();
        assert_eq!(json, "\"mysql\"");
        let parsed: EngineType = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(parsed, EngineType::Postgres);
    }

    #[test]
    fn version_support() {
        assert!(EngineType::Postgres.is_supported_version("15"));
        assert!(!EngineType::Postgres.is_supported_version("8.0"));
        assert!(EngineType::Mysql.is_supported_version("8.0"));
        assert!(!EngineType::Mysql.is_supported_version("15"));
    }

    #[test]
    fn mysql_bootstrap_sets_root_password() {
        let env = EngineType::Mysql.bootstrap_env("app", "secret", "shop");
        assert!(env.contains(&("MYSQL_ROOT_PASSWORD".to_string(), "secret".to_string())));
        assert!(env.contains(&("MYSQL_DATABASE".to_string(), "shop".to_string())));
        assert!(env.contains(&("MYSQL_USER".to_string(), "app".to_string())));
    }

    #[test]
    fn mysql_root_user_is_not_duplicated() {
        let env = EngineType::Mysql.bootstrap_env("root", "secret", "shop");
        assert!(env.iter().all(|(k, _)| k != "MYSQL_USER"));
    }

    #[test]
    fn image_and_ports() {
        assert_eq!(EngineType::Postgres.image("16"), "postgres:16");
        assert_eq!(EngineType::Mysql.default_port(), 3306);
        assert_eq!(EngineType::Postgres.dump_extension(), "dump");
    }
}
