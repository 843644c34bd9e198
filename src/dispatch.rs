use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::collect::Collector;
use crate::error::{FailTrackError, Result};
use crate::models::BuildId;

/// Payload handed to a collector invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectRequest {
    pub build_id: BuildId,
}

/// Fire-and-forget invocation of the collector.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Start collecting `build_id` without waiting for it to finish.
    async fn dispatch(&self, build_id: BuildId) -> Result<()>;

    /// Wait for everything dispatched so far.
    async fn drain(&self);
}

/// Handles of spawned invocations.
#[derive(Default)]
struct InFlight {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InFlight {
    fn track(&self, handle: JoinHandle<()>) -> Result<()> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| FailTrackError::Store("dispatch registry lock poisoned".to_string()))?;
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        Ok(())
    }

    async fn drain(&self) {
        let pending = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => return,
        };

        for outcome in futures::future::join_all(pending).await {
            if let Err(e) = outcome {
                error!("Dispatched task panicked: {e}");
            }
        }
    }
}

/// Runs collections as tasks on the current runtime.
pub struct LocalDispatcher {
    collector: Arc<Collector>,
    in_flight: InFlight,
}

impl LocalDispatcher {
    pub fn new(collector: Arc<Collector>) -> Self {
        Self {
            collector,
            in_flight: InFlight::default(),
        }
    }
}

#[async_trait]
impl Dispatcher for LocalDispatcher {
    async fn dispatch(&self, build_id: BuildId) -> Result<()> {
        let collector = self.collector.clone();
        let handle = tokio::spawn(async move {
            // the collector logs its own outcome
            let _ = collector.collect(build_id).await;
        });

        info!("Dispatched build {build_id} to local collector");
        self.in_flight.track(handle)
    }

    async fn drain(&self) {
        self.in_flight.drain().await;
    }
}

/// Posts collection requests to a running `failtrack serve` instance.
pub struct HttpDispatcher {
    client: Client,
    collect_url: Url,
    in_flight: InFlight,
}

impl HttpDispatcher {
    pub fn new(collector_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("failtrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FailTrackError::Config(format!("Failed to create HTTP client: {e}")))?;

        // relative join keeps any path prefix the collector is mounted under
        let normalized = format!("{}/", collector_url.trim_end_matches('/'));
        let collect_url = Url::parse(&normalized)
            .map_err(|e| FailTrackError::Config(format!("Invalid collector URL: {e}")))?
            .join("api/v1/collect")
            .map_err(|e| FailTrackError::Config(format!("Invalid collect URL: {e}")))?;

        Ok(Self {
            client,
            collect_url,
            in_flight: InFlight::default(),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, build_id: BuildId) -> Result<()> {
        let request = self
            .client
            .post(self.collect_url.clone())
            .json(&CollectRequest { build_id });

        let handle = tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("Remote collection of build {build_id} finished");
                }
                Ok(response) => {
                    warn!(
                        "Remote collection of build {build_id} failed with {}",
                        response.status()
                    );
                }
                Err(e) => error!("Failed to reach collector for build {build_id}: {e}"),
            }
        });

        info!("Dispatched build {build_id} to {}", self.collect_url);
        self.in_flight.track(handle)
    }

    async fn drain(&self) {
        self.in_flight.drain().await;
    }
}
