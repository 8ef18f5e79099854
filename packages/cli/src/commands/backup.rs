//! `devdb backup` command

use anyhow::Result;
use common::api::BackupRequest;

use crate::client::ApiClient;

pub fn run(client: &ApiClient, project_id: &str, request: BackupRequest) -> Result<()> {
    let source = format!("{}@{}/{}", request.username, request.host, request.database);
    let artifact = client.create_backup(project_id, &request)?;

    println!("Backup of {source} uploaded");
    println!("  Location: {}", artifact.location);
    println!("  Size: {} bytes", artifact.size_bytes);
    println!("  Content type: {}", artifact.content_type);
    println!(
        "Use it with: devdb project create <name> --backup {}",
        artifact.location
    );
    Ok(())
}
