use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use crate::api::{self, state::AppState};
use crate::auth::Credentials;
use crate::collect::Collector;
use crate::config::{ScanSettings, DEFAULT_MAX_BATCH, DEFAULT_WINDOW_DAYS};
use crate::dispatch::{Dispatcher, HttpDispatcher, LocalDispatcher};
use crate::error::FailTrackError;
use crate::models::{BuildId, ScanLogRecord, ScanStatus};
use crate::providers::jenkins::JenkinsClient;
use crate::providers::CiSource;
use crate::scan::ScanTrigger;
use crate::store::{MemoryStore, SqliteStore, Store};

const IN_MEMORY: &str = ":memory:";

#[derive(Parser)]
#[command(name = "failtrack")]
#[command(author, version, about = "Failing-test history for Jenkins builds", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Jenkins job URL (e.g. "https://ci.example.com/job/app/job/master")
    #[arg(long, env = "JENKINS_URL", global = true)]
    jenkins_url: Option<String>,

    /// Jenkins user for basic auth
    #[arg(long, env = "JENKINS_USERNAME", global = true)]
    username: Option<String>,

    /// Jenkins password or API token
    #[arg(long, env = "JENKINS_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// SQLite database path (":memory:" keeps everything in process)
    #[arg(long, env = "FAILTRACK_DB", global = true, default_value = "failtrack.db")]
    database: PathBuf,

    /// Days of scan log consulted to find already scanned builds
    #[arg(long, global = true, default_value_t = DEFAULT_WINDOW_DAYS)]
    window_days: u32,

    /// Maximum builds dispatched per scan
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_BATCH)]
    max_batch: usize,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find unscanned builds and dispatch their collection
    Scan {
        /// Dispatch to a running `failtrack serve` instead of collecting in process
        #[arg(long)]
        collector_url: Option<String>,
    },

    /// Collect the failing tests of one build
    Collect {
        build_id: BuildId,
    },

    /// Serve the collection API, optionally scanning on an interval
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Seconds between scans (0 disables periodic scanning)
        #[arg(long, default_value_t = 0)]
        scan_interval_secs: u64,
    },

    /// Mark a build as scanned so the next scan starts after it
    Seed {
        build_id: BuildId,
    },

    /// Print the stored history of a test ("ClassName.testName")
    History {
        test_name: String,
    },
}

impl Cli {
    fn open_store(&self) -> Result<Arc<dyn Store>> {
        if self.database == Path::new(IN_MEMORY) {
            return Ok(Arc::new(MemoryStore::new()));
        }

        let store = SqliteStore::open(&self.database)
            .with_context(|| format!("Failed to open database {}", self.database.display()))?;
        Ok(Arc::new(store))
    }

    fn ci_source(&self) -> Result<Arc<dyn CiSource>> {
        let url = self.jenkins_url.as_deref().ok_or_else(|| {
            FailTrackError::Config("--jenkins-url (or JENKINS_URL) is required".to_string())
        })?;
        let credentials =
            Credentials::from_parts(self.username.as_deref(), self.password.as_deref());
        match &credentials {
            Some(credentials) => info!("Authenticating to Jenkins as {}", credentials.username()),
            None => info!("Accessing Jenkins anonymously"),
        }

        Ok(Arc::new(JenkinsClient::new(url, credentials)?))
    }

    fn settings(&self) -> Result<ScanSettings> {
        Ok(ScanSettings::new(self.window_days, self.max_batch)?)
    }

    fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Scan { collector_url } => {
                let store = self.open_store()?;
                let ci = self.ci_source()?;
                let dispatcher: Arc<dyn Dispatcher> = match collector_url {
                    Some(url) => Arc::new(HttpDispatcher::new(url)?),
                    None => Arc::new(LocalDispatcher::new(Arc::new(Collector::new(
                        ci.clone(),
                        store.clone(),
                    )))),
                };

                let trigger = ScanTrigger::new(ci, store, dispatcher.clone(), self.settings()?);
                let dispatched = trigger.run().await?;
                dispatcher.drain().await;

                self.write_json(&dispatched)
            }
            Commands::Collect { build_id } => {
                let collector = Collector::new(self.ci_source()?, self.open_store()?);
                let report = collector.collect(*build_id).await?;

                self.write_json(&report)
            }
            Commands::Serve {
                bind,
                scan_interval_secs,
            } => self.serve(bind, *scan_interval_secs).await,
            Commands::Seed { build_id } => {
                let store = self.open_store()?;
                store
                    .record_scan(&ScanLogRecord {
                        build_id: *build_id,
                        status: ScanStatus::Completed,
                        started_at: Utc::now(),
                    })
                    .await?;
                info!("Seeded scan log with build {build_id}");

                Ok(())
            }
            Commands::History { test_name } => {
                let store = self.open_store()?;
                let record = store
                    .history(test_name)
                    .await?
                    .with_context(|| format!("No history recorded for {test_name}"))?;

                self.write_json(&record)
            }
        }
    }

    async fn serve(&self, bind: &str, scan_interval_secs: u64) -> Result<()> {
        let store = self.open_store()?;
        let ci = self.ci_source()?;
        let collector = Arc::new(Collector::new(ci.clone(), store.clone()));
        let dispatcher = Arc::new(LocalDispatcher::new(collector.clone()));
        let trigger = Arc::new(ScanTrigger::new(
            ci,
            store.clone(),
            dispatcher,
            self.settings()?,
        ));

        if scan_interval_secs > 0 {
            tokio::spawn(run_scan_loop(
                trigger.clone(),
                Duration::from_secs(scan_interval_secs),
            ));
        }

        let app = api::router(AppState {
            collector,
            trigger,
            store,
        });

        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind {bind}"))?;
        info!("Listening on {bind}");
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn run_scan_loop(trigger: Arc<ScanTrigger>, every: Duration) {
    info!("Scanning every {}s", every.as_secs());

    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;

        if let Err(e) = trigger.run().await {
            error!("Scheduled scan failed: {e}");
        }
    }
}
