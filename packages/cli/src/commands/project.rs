//! `devdb project` commands

use std::fmt::Write;

use anyhow::Result;
use common::EngineType;
use common::api::{CreateProjectRequest, CredentialsInput, CredentialsView, ProjectResponse};

use crate::client::ApiClient;

pub struct CreateArgs {
    pub owner: String,
    pub name: String,
    pub engine: EngineType,
    pub version: String,
    pub backup: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

pub(crate) fn render_credentials(out: &mut String, creds: &CredentialsView) {
    let _ = writeln!(out, "  Username: {}", creds.username);
    let _ = writeln!(out, "  Database: {}", creds.database_name);
    if let Some(password) = &creds.password {
        let _ = writeln!(out, "  Password: {password}");
    }
}

pub(crate) fn render_project(project: &ProjectResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  ID: {}", project.id);
    let _ = writeln!(out, "  Name: {}", project.name);
    let _ = writeln!(out, "  Owner: {}", project.owner);
    let _ = writeln!(out, "  Engine: {} {}", project.engine_type, project.engine_version);
    if let Some(backup) = &project.backup_location {
        let _ = writeln!(out, "  Backup: {backup}");
    }
    render_credentials(&mut out, &project.default_credentials);
    out
}

pub fn create(client: &ApiClient, args: CreateArgs) -> Result<()> {
    let credentials = (args.username.is_some()
        || args.password.is_some()
        || args.database.is_some())
    .then_some(CredentialsInput {
        username: args.username,
        password: args.password,
        database_name: args.database,
    });

    let project = client.create_project(&CreateProjectRequest {
        owner: args.owner,
        name: args.name,
        engine_type: args.engine,
        engine_version: args.version,
        backup_location: args.backup,
        credentials,
    })?;

    println!("Project created successfully");
    print!("{}", render_project(&project));
    if project.default_credentials.password.is_some() {
        println!("The password is shown only once; store it now.");
    }
    Ok(())
}

pub fn list(client: &ApiClient, owner: Option<&str>) -> Result<()> {
    let projects = client.list_projects(owner)?;
    if projects.is_empty() {
        println!("No projects found");
        return Ok(());
    }

    println!("Projects:");
    for project in &projects {
        println!("- {} (ID: {})", project.name, project.id);
        println!("  Owner: {}", project.owner);
        println!("  Engine: {} {}", project.engine_type, project.engine_version);
    }
    Ok(())
}

pub fn show(client: &ApiClient, id: &str) -> Result<()> {
    let detail = client.get_project(id)?;
    print!("{}", render_project(&detail.project));
    if detail.databases.is_empty() {
        println!("  Databases: none");
    } else {
        println!("  Databases:");
        for db in &detail.databases {
            println!("  - {} ({})", db.name, db.status);
        }
    }
    Ok(())
}
