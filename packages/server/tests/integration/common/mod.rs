use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ::common::config::{StorageBackend, StorageConfig};
use ::common::storage::filesystem::FilesystemObjectStore;
use async_trait::async_trait;
use backup::capture::DumpCommand;
use backup::config::BackupConfig;
use backup::{CaptureError, DumpRunner, TokenProvider};
use reqwest::Client;
use serde_json::{Value, json};
use tempfile::TempDir;

use server::config::{
    AppConfig, CorsConfig, DefaultsConfig, OrchestratorConfig, PlatformConfig, RegistryConfig,
    ServerConfig, SnapshotConfig,
};
use server::platform::InMemoryPlatform;
use server::registry::MemoryKv;
use server::state::{AppState, Backends};

pub mod routes {
    pub const PROJECTS: &str = "/projects";
    pub const HEALTH: &str = "/health";
    pub const OPENAPI: &str = "/api-docs/openapi.json";

    pub fn project(id: &str) -> String {
        format!("/projects/{id}")
    }

    pub fn databases(project_id: &str) -> String {
        format!("/projects/{project_id}/databases")
    }

    pub fn database(project_id: &str, name: &str) -> String {
        format!("/projects/{project_id}/databases/{name}")
    }

    pub fn snapshots(project_id: &str) -> String {
        format!("/projects/{project_id}/snapshots")
    }

    pub fn initialize_snapshot(project_id: &str) -> String {
        format!("/projects/{project_id}/snapshots/initialize")
    }

    pub fn backup(project_id: &str) -> String {
        format!("/projects/{project_id}/backup")
    }
}

/// Issues a fixed token so IAM captures work without AWS credentials.
struct StaticTokens;

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn token(&self, _: &str, _: u16, username: &str) -> Result<String, CaptureError> {
        Ok(format!("token-for-{username}"))
    }
}

/// Writes a small SQL payload instead of invoking the engine's dump tool.
struct CannedDumps;

#[async_trait]
impl DumpRunner for CannedDumps {
    async fn run(&self, command: &DumpCommand) -> Result<(), CaptureError> {
        tokio::fs::write(&command.output, b"CREATE TABLE orders (id int);\n").await?;
        Ok(())
    }
}

/// A running test server backed by in-memory registry and platform.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub platform: Arc<InMemoryPlatform>,
    _dir: TempDir,
}

/// Parsed HTTP response for test assertions.
pub struct TestResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    /// Raw response body as text.
    pub text: String,
    /// Parsed JSON body, or `Null` if the response is not valid JSON.
    pub body: Value,
}

impl TestResponse {
    async fn from_response(res: reqwest::Response) -> Self {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let text = res.text().await.expect("Failed to read response body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Self {
            status,
            headers,
            text,
            body,
        }
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

fn test_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors: CorsConfig {
                allow_origins: vec!["http://localhost:3000".to_string()],
                max_age: 3600,
            },
            release: "2026.10.1".to_string(),
        },
        registry: RegistryConfig::default(),
        platform: PlatformConfig::default(),
        snapshots: SnapshotConfig {
            settle_delay_secs: 0,
            readiness_poll_secs: 0,
            ..Default::default()
        },
        orchestrator: OrchestratorConfig {
            lock_wait_secs: 0,
            recovery_on_startup: false,
            ..Default::default()
        },
        storage: StorageConfig {
            backend: StorageBackend::Filesystem,
            base_path: dir.path().join("objects").to_string_lossy().into_owned(),
            ..Default::default()
        },
        backup: BackupConfig {
            staging_dir: dir.path().join("staging"),
            probe_timeout_secs: 2,
            aws_region: None,
        },
        defaults: DefaultsConfig::default(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir);

        let platform = Arc::new(InMemoryPlatform::new());
        let store = FilesystemObjectStore::new(dir.path().join("objects"))
            .await
            .expect("Failed to create object store");
        let backends = Backends {
            kv: Arc::new(MemoryKv::new()),
            platform: platform.clone(),
            store: Arc::new(store),
            tokens: Arc::new(StaticTokens),
            dumps: Arc::new(CannedDumps),
        };
        let state = AppState::new(config, backends).expect("Failed to build app state");

        let app = server::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            client: Client::new(),
            platform,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post(&self, path: &str, body: &Value) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let res = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .expect("Failed to send POST request");

        TestResponse::from_response(res).await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request");

        TestResponse::from_response(res).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        let res = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request");

        TestResponse::from_response(res).await
    }

    /// Create a postgres 16 project and return its id.
    pub async fn create_project(&self, owner: &str, name: &str) -> String {
        self.create_project_with(json!({
            "owner": owner,
            "name": name,
            "engineType": "postgres",
            "engineVersion": "16",
        }))
        .await
    }

    pub async fn create_project_with(&self, body: Value) -> String {
        let res = self.post(routes::PROJECTS, &body).await;
        assert_eq!(res.status, 201, "create_project failed: {}", res.text);
        res.body["id"]
            .as_str()
            .expect("Project response has no id")
            .to_string()
    }

    pub async fn create_database(&self, project_id: &str, name: &str) -> TestResponse {
        self.post(&routes::databases(project_id), &json!({ "name": name }))
            .await
    }

    /// Poll the snapshot listing until the background capture has produced
    /// at least one snapshot.
    pub async fn wait_for_snapshots(&self, project_id: &str) -> Vec<Value> {
        for _ in 0..100 {
            let res = self.get(&routes::snapshots(project_id)).await;
            assert_eq!(res.status, 200, "list_snapshots failed: {}", res.text);
            if let Some(items) = res.body.as_array()
                && !items.is_empty()
            {
                return items.clone();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("No snapshot captured for {project_id}");
    }
}
