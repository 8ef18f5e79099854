use anyhow::{Context, bail};
use common::api::{
    ApiErrorBody, BackupRequest, BackupResponse, CreateDatabaseRequest, CreateDatabaseResponse,
    CreateProjectRequest, DatabaseListResponse, DeleteDatabaseResponse, ProjectDetailResponse,
    ProjectResponse, SnapshotResponse,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

/// Blocking client for the devdb HTTP API.
pub struct ApiClient {
    base: String,
    http: Client,
}

/// Render a failed response as `"<status>: <code>: <message>"`, falling back
/// to the raw body when it is not an API error payload.
pub fn describe_failure(status: u16, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => format!("{status}: {}: {}", err.code, err.message),
        Err(_) if body.trim().is_empty() => format!("{status}: empty response"),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("devdb-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base: base.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> anyhow::Result<T> {
        let response: Response = request
            .send()
            .with_context(|| format!("Failed to reach the devdb API at {}", self.base))?;
        let status = response.status();
        let body = response.text().context("Failed to read response body")?;
        if !status.is_success() {
            bail!("API request failed with {}", describe_failure(status.as_u16(), &body));
        }
        serde_json::from_str(&body).context("Unexpected response from the devdb API")
    }

    pub fn create_project(&self, request: &CreateProjectRequest) -> anyhow::Result<ProjectResponse> {
        self.send(self.http.post(self.url("/projects")).json(request))
    }

    pub fn list_projects(&self, owner: Option<&str>) -> anyhow::Result<Vec<ProjectResponse>> {
        let mut request = self.http.get(self.url("/projects"));
        if let Some(owner) = owner {
            request = request.query(&[("owner", owner)]);
        }
        self.send(request)
    }

    pub fn get_project(&self, id: &str) -> anyhow::Result<ProjectDetailResponse> {
        self.send(self.http.get(self.url(&format!("/projects/{id}"))))
    }

    pub fn create_database(
        &self,
        project_id: &str,
        request: &CreateDatabaseRequest,
    ) -> anyhow::Result<CreateDatabaseResponse> {
        self.send(
            self.http
                .post(self.url(&format!("/projects/{project_id}/databases")))
                .json(request),
        )
    }

    pub fn list_databases(&self, project_id: &str) -> anyhow::Result<DatabaseListResponse> {
        self.send(
            self.http
                .get(self.url(&format!("/projects/{project_id}/databases"))),
        )
    }

    pub fn delete_database(
        &self,
        project_id: &str,
        name: &str,
    ) -> anyhow::Result<DeleteDatabaseResponse> {
        self.send(
            self.http
                .delete(self.url(&format!("/projects/{project_id}/databases/{name}"))),
        )
    }

    pub fn list_snapshots(&self, project_id: &str) -> anyhow::Result<Vec<SnapshotResponse>> {
        self.send(
            self.http
                .get(self.url(&format!("/projects/{project_id}/snapshots"))),
        )
    }

    pub fn create_backup(
        &self,
        project_id: &str,
        request: &BackupRequest,
    ) -> anyhow::Result<BackupResponse> {
        self.send(
            self.http
                .post(self.url(&format!("/projects/{project_id}/backup")))
                .json(request),
        )
    }
}
