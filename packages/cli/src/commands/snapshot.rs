//! `devdb snapshots` command

use anyhow::Result;

use crate::client::ApiClient;

pub fn list(client: &ApiClient, project_id: &str) -> Result<()> {
    let snapshots = client.list_snapshots(project_id)?;
    if snapshots.is_empty() {
        println!("No snapshots found");
        return Ok(());
    }

    println!("Snapshots (newest first):");
    for snapshot in &snapshots {
        let created = snapshot
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".into());
        let state = if snapshot.ready_to_use { "ready" } else { "not ready" };
        println!("- {} ({state})", snapshot.name);
        println!("  Created: {created}");
        if let Some(version) = &snapshot.engine_version {
            println!("  Engine version: {version}");
        }
        if let Some(backup) = &snapshot.backup_location {
            println!("  Seeded from: {backup}");
        }
    }
    Ok(())
}
