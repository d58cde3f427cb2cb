//! REST client for the simulation server.
//!
//! Covers the point-in-time fetches used to seed views and the thin command
//! surface (start/stop/tick/move).

use crate::model::{Agent, Resource, Simulation, World};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    std::env::var("SIMWATCH_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Point-in-time state used to seed views before they go event-driven
pub trait SeedSource: Send + Sync {
    fn simulation<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Simulation>>;

    fn world<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<World>>;

    fn agents<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Vec<Agent>>>;

    fn agent<'a>(&'a self, sim: &'a str, agent: &'a str) -> BoxFuture<'a, Result<Agent>>;

    fn resources<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Vec<Resource>>>;
}

/// Move command body
#[derive(Debug, Clone, Serialize)]
struct MoveRequest {
    x_coord: i32,
    y_coord: i32,
}

/// HTTP client for the simulation REST API
#[derive(Clone)]
pub struct SimulationApi {
    client: reqwest::Client,
    base_url: String,
}

impl SimulationApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(format!("Failed to send GET {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("GET {} failed with status {}: {}", url, status, body));
        }

        response
            .json::<T>()
            .await
            .context(format!("Failed to parse response from {}", url))
    }

    async fn post<B: Serialize>(&self, path: &str, body: Option<&B>) -> Result<()> {
        let url = self.url(path);
        debug!("POST {}", url);

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .context(format!("Failed to send POST {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("POST {} failed with status {}: {}", url, status, body));
        }
        Ok(())
    }

    pub async fn start(&self, sim: &str) -> Result<()> {
        self.post::<()>(&format!("/orchestrator/start/{sim}"), None).await
    }

    pub async fn stop(&self, sim: &str) -> Result<()> {
        self.post::<()>(&format!("/orchestrator/stop/{sim}"), None).await
    }

    pub async fn tick(&self, sim: &str) -> Result<()> {
        self.post::<()>(&format!("/orchestrator/tick/{sim}"), None).await
    }

    /// Ask the server to move an agent. The grid only animates the move once
    /// the server confirms it with a `moved` event.
    pub async fn move_agent(&self, sim: &str, agent: &str, x: i32, y: i32) -> Result<()> {
        let body = MoveRequest { x_coord: x, y_coord: y };
        self.post(&format!("/simulation/{sim}/agent/{agent}/move"), Some(&body))
            .await
    }
}

impl SeedSource for SimulationApi {
    fn simulation<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Simulation>> {
        async move { self.get_json(&format!("/simulation/{sim}")).await }.boxed()
    }

    fn world<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<World>> {
        async move { self.get_json(&format!("/simulation/{sim}/world")).await }.boxed()
    }

    fn agents<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Vec<Agent>>> {
        async move { self.get_json(&format!("/simulation/{sim}/agent")).await }.boxed()
    }

    fn agent<'a>(&'a self, sim: &'a str, agent: &'a str) -> BoxFuture<'a, Result<Agent>> {
        async move { self.get_json(&format!("/simulation/{sim}/agent/{agent}")).await }.boxed()
    }

    fn resources<'a>(&'a self, sim: &'a str) -> BoxFuture<'a, Result<Vec<Resource>>> {
        async move { self.get_json(&format!("/simulation/{sim}/resource")).await }.boxed()
    }
}
