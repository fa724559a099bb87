//! Test server harness for end-to-end HTTP tests.
//!
//! `TestHubServer` runs the real router on a random local port over the
//! in-memory repositories and fake collaborators, so HTTP tests need no
//! database.

use crate::collaborators::{MemoryBlobStore, RecordingNotifier};
use crate::fixtures::test_config;
use crate::memory::{MemoryMeetingRepository, MemoryUserRepository};
use hub_service::config::Config;
use hub_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Repositories and collaborators behind a test app, kept for assertions.
#[derive(Clone, Default)]
pub struct TestBackends {
    pub users: Arc<MemoryUserRepository>,
    pub meetings: Arc<MemoryMeetingRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub blob_store: Arc<MemoryBlobStore>,
}

impl TestBackends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Application state wired over these backends.
    pub fn app_state(&self, config: Config) -> AppState {
        AppState::new(
            config,
            self.users.clone(),
            self.meetings.clone(),
            self.notifier.clone(),
            self.blob_store.clone(),
        )
    }
}

pub struct TestHubServer {
    addr: SocketAddr,
    backends: TestBackends,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestHubServer {
    /// Spawn with `test_config()` and fresh backends.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(test_config(), TestBackends::new()).await
    }

    pub async fn spawn_with(config: Config, backends: TestBackends) -> Result<Self, anyhow::Error> {
        let state = Arc::new(backends.app_state(config));

        // A recorder handle that is never installed globally, so several
        // servers can coexist in one test binary.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state.clone(), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            backends,
            state,
            _handle: handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn backends(&self) -> &TestBackends {
        &self.backends
    }

    /// Services behind the router, for arranging state without HTTP.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

impl Drop for TestHubServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_and_serves_health() -> Result<(), anyhow::Error> {
        let server = TestHubServer::spawn().await?;
        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_different_ports() -> Result<(), anyhow::Error> {
        let first = TestHubServer::spawn().await?;
        let second = TestHubServer::spawn().await?;
        assert_ne!(first.addr(), second.addr());
        Ok(())
    }

    #[tokio::test]
    async fn test_api_url_is_versioned() -> Result<(), anyhow::Error> {
        let server = TestHubServer::spawn().await?;
        assert!(server.api("/users/login").ends_with("/api/v1/users/login"));
        Ok(())
    }
}
