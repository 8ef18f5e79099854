//! devdb CLI

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use common::EngineType;
use common::api::BackupRequest;

mod client;
mod commands;
mod config;

use client::ApiClient;
use config::{FileConfig, Settings};

#[derive(Parser)]
#[command(name = "devdb")]
#[command(author, version, about = "DevDB - development database manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// DevDB API URL
    #[arg(long, global = true, env = "DEVDB_API_URL")]
    api_url: Option<String>,

    /// Config file (default is ~/.devdb.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage database instances of a project
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Dump a live database into object storage
    Backup {
        /// Project the backup is filed under
        project: String,

        #[arg(long)]
        host: String,

        /// Defaults to the engine's standard port
        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        username: String,

        #[arg(long, env = "DEVDB_BACKUP_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Authenticate with an RDS IAM token instead of a password
        #[arg(long)]
        iam: bool,

        #[arg(long)]
        database: String,

        /// Connect here instead of --host (IAM tokens are still issued for --host)
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// List a project's snapshots
    Snapshots {
        project: String,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a new project
    Create {
        name: String,

        /// Defaults to the current user
        #[arg(long)]
        owner: Option<String>,

        /// Database engine (postgres or mysql)
        #[arg(long = "engine", default_value = "postgres")]
        engine: EngineType,

        #[arg(long, default_value = "16")]
        engine_version: String,

        /// Backup to restore the first database from (http(s):// or s3://)
        #[arg(long)]
        backup: Option<String>,

        #[arg(long)]
        username: Option<String>,

        /// Generated by the server when omitted
        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        database: Option<String>,
    },

    /// List projects of an owner
    List {
        /// Defaults to the current user
        #[arg(long, conflicts_with = "all")]
        owner: Option<String>,

        /// List projects of every owner
        #[arg(long)]
        all: bool,
    },

    /// Show a project and its databases
    Show {
        id: String,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Create a database instance
    Create {
        project: String,
        name: String,

        /// Restore from this backup instead of the project's (first instance only)
        #[arg(long)]
        backup: Option<String>,
    },

    /// List database instances
    List {
        project: String,
    },

    /// Delete a database instance
    Delete {
        project: String,
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(FileConfig::default_path);
    let file = match &config_path {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(cli.api_url, file);
    let client = ApiClient::new(&settings.api_url)?;

    match cli.command {
        Commands::Project { action } => match action {
            ProjectAction::Create {
                name,
                owner,
                engine,
                engine_version,
                backup,
                username,
                password,
                database,
            } => {
                let owner = settings.owner(owner)?;
                commands::project::create(
                    &client,
                    commands::project::CreateArgs {
                        owner,
                        name,
                        engine,
                        version: engine_version,
                        backup,
                        username,
                        password,
                        database,
                    },
                )?;
            }
            ProjectAction::List { owner, all } => {
                let owner = if all { None } else { Some(settings.owner(owner)?) };
                commands::project::list(&client, owner.as_deref())?;
            }
            ProjectAction::Show { id } => {
                commands::project::show(&client, &id)?;
            }
        },
        Commands::Db { action } => match action {
            DbAction::Create {
                project,
                name,
                backup,
            } => {
                commands::db::create(&client, &project, name, backup)?;
            }
            DbAction::List { project } => {
                commands::db::list(&client, &project)?;
            }
            DbAction::Delete { project, name } => {
                commands::db::delete(&client, &project, &name)?;
            }
        },
        Commands::Backup {
            project,
            host,
            port,
            username,
            password,
            iam,
            database,
            endpoint,
        } => {
            if !iam && password.is_none() {
                anyhow::bail!("--password (or DEVDB_BACKUP_PASSWORD) is required unless --iam is set");
            }
            commands::backup::run(
                &client,
                &project,
                BackupRequest {
                    host,
                    port,
                    username,
                    password,
                    use_iam_auth: iam,
                    database,
                    endpoint_override: endpoint,
                },
            )
            .context("Backup failed")?;
        }
        Commands::Snapshots { project } => {
            commands::snapshot::list(&client, &project)?;
        }
    }

    Ok(())
}
