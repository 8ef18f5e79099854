//! `devdb db` commands

use anyhow::Result;
use common::api::{CreateDatabaseRequest, CreateDatabaseResponse, DatabaseResponse, SeedStrategyKind};

use crate::client::ApiClient;
use crate::commands::project::render_credentials;

fn print_database(db: &DatabaseResponse) {
    println!("  Name: {}", db.name);
    println!("  Status: {}", db.status);
    match &db.host {
        Some(host) => println!("  Host: {host}"),
        None => println!("  Host: (pending)"),
    }
    println!("  Port: {}", db.port);
    let mut creds = String::new();
    render_credentials(&mut creds, &db.credentials);
    print!("{creds}");
}

/// One-line description of where a new instance's data came from.
pub(crate) fn describe_seed(created: &CreateDatabaseResponse) -> String {
    match created.strategy {
        SeedStrategyKind::FreshEmpty => "empty database".to_string(),
        SeedStrategyKind::CloneFromSnapshot => format!(
            "cloned from snapshot {}",
            created.source_snapshot.as_deref().unwrap_or("(unknown)")
        ),
        SeedStrategyKind::RestoreFromBackup => format!(
            "restored from backup {}",
            created.source_backup.as_deref().unwrap_or("(unknown)")
        ),
    }
}

pub fn create(
    client: &ApiClient,
    project_id: &str,
    name: String,
    backup: Option<String>,
) -> Result<()> {
    let created = client.create_database(
        project_id,
        &CreateDatabaseRequest {
            name,
            backup_location: backup,
        },
    )?;

    println!("Database created successfully ({})", describe_seed(&created));
    print_database(&created.database);
    if created.snapshot_scheduled {
        println!("A snapshot will be taken once the database is ready.");
    }
    Ok(())
}

pub fn list(client: &ApiClient, project_id: &str) -> Result<()> {
    let list = client.list_databases(project_id)?;
    if list.databases.is_empty() {
        println!("No databases found");
        return Ok(());
    }

    println!("Databases:");
    for db in &list.databases {
        println!("- {} (Status: {})", db.name, db.status);
        if let Some(host) = &db.host {
            println!("  Host: {host}:{}", db.port);
        }
        println!(
            "  Username: {} Database: {}",
            db.credentials.username, db.credentials.database_name
        );
    }
    Ok(())
}

pub fn delete(client: &ApiClient, project_id: &str, name: &str) -> Result<()> {
    let deleted = client.delete_database(project_id, name)?;
    println!("Database {} deleted from {}", deleted.name, deleted.project_id);
    if !deleted.volume_deleted {
        println!("Its volume was kept.");
    }
    Ok(())
}
