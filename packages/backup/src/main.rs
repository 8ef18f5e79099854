use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use backup::config::ToolConfig;
use backup::restore::prepare_init_dir;
use backup::{
    BackupCapture, BackupImporter, BackupSource, CaptureRequest, ConnectionDescriptor,
    ProcessDumpRunner, RdsTokenProvider,
};
use clap::{Parser, Subcommand};
use common::EngineType;
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "devdb-backup")]
#[command(version, about = "Capture and stage devdb database backups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump a live database and upload it to object storage
    Capture {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        engine: EngineType,
        #[arg(long)]
        host: String,
        /// Defaults to the engine's standard port
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        username: String,
        #[arg(long, env = "DEVDB_DB_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Authenticate with a short-lived IAM token instead of a password
        #[arg(long)]
        iam: bool,
        #[arg(long)]
        database: String,
        /// Address to dial instead of --host
        #[arg(long)]
        endpoint_override: Option<String>,
    },

    /// Download a backup into an engine init directory
    Stage {
        /// http(s):// URL or s3://bucket/key reference
        #[arg(long)]
        source: String,
        #[arg(long)]
        engine: EngineType,
        #[arg(long, default_value = common::engine::INIT_SCRIPTS_DIR)]
        dest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = ToolConfig::load().context("Failed to load configuration")?;
    let store = common::storage::from_config(&config.storage)
        .await
        .context("Failed to initialise object storage")?;

    match cli.command {
        Commands::Capture {
            owner,
            project_id,
            engine,
            host,
            port,
            username,
            password,
            iam,
            database,
            endpoint_override,
        } => {
            let connection = ConnectionDescriptor::new(
                host,
                port.unwrap_or_else(|| engine.default_port()),
                username,
                password,
                iam,
                database,
                endpoint_override,
            )?;
            let capture = BackupCapture::new(
                store,
                Arc::new(RdsTokenProvider::new(config.backup.aws_region.clone())),
                Arc::new(ProcessDumpRunner),
                config.storage.bucket.clone(),
                config.backup.staging_dir.clone(),
                config.backup.probe_timeout(),
            );
            let artifact = capture
                .run(&CaptureRequest {
                    owner,
                    project_id,
                    engine,
                    connection,
                })
                .await?;
            println!("{}", artifact.object);
        }
        Commands::Stage {
            source,
            engine,
            dest,
        } => {
            let source = BackupSource::parse(&source)?;
            let importer = BackupImporter::new(store, config.backup.probe_timeout())?;
            let staged = importer
                .try_stage(&source, &dest)
                .await
                .with_context(|| format!("Failed to stage {source}"))?;
            let files = prepare_init_dir(engine, &staged, &dest).await?;
            for file in files {
                info!(path = %file.display(), "Prepared init file");
            }
        }
    }

    Ok(())
}
