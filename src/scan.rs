use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use crate::config::ScanSettings;
use crate::dispatch::Dispatcher;
use crate::error::{FailTrackError, Result};
use crate::models::BuildId;
use crate::providers::CiSource;
use crate::store::Store;

/// Pick the builds newer than the high-water mark that were not scanned yet.
///
/// `builds` is in server order (most recent first); the result keeps that
/// order and holds at most `max_batch` ids.
pub fn select_new_builds(
    builds: &[BuildId],
    logged: &[BuildId],
    max_batch: usize,
) -> Result<Vec<BuildId>> {
    let high_water_mark = logged
        .iter()
        .copied()
        .max()
        .ok_or(FailTrackError::NoScanHistory)?;
    let logged: HashSet<BuildId> = logged.iter().copied().collect();

    let candidates: Vec<BuildId> = match builds.iter().position(|b| *b == high_water_mark) {
        Some(index) => builds[..index].to_vec(),
        None => {
            warn!(
                "Last scanned build {high_water_mark} is not in the CI build list; selecting builds above it"
            );
            builds
                .iter()
                .copied()
                .filter(|b| *b > high_water_mark)
                .collect()
        }
    };

    Ok(candidates
        .into_iter()
        .filter(|b| !logged.contains(b))
        .take(max_batch)
        .collect())
}

/// Finds unscanned builds and fans them out to the collector.
pub struct ScanTrigger {
    ci: Arc<dyn CiSource>,
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    settings: ScanSettings,
}

impl ScanTrigger {
    pub fn new(
        ci: Arc<dyn CiSource>,
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn Dispatcher>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            ci,
            store,
            dispatcher,
            settings,
        }
    }

    /// Returns the selected build ids, whether or not each dispatch succeeded.
    pub async fn run(&self) -> Result<Vec<BuildId>> {
        let builds = self.ci.completed_builds().await?;
        let cutoff = Utc::now() - self.settings.window;
        let logged = self.store.scanned_since(cutoff).await?;

        info!(
            "CI reports {} completed builds, {} scanned since {cutoff}",
            builds.len(),
            logged.len()
        );

        let selected = select_new_builds(&builds, &logged, self.settings.max_batch)?;

        if selected.is_empty() {
            info!("No new builds to scan");
            return Ok(selected);
        }

        for &build_id in &selected {
            if let Err(e) = self.dispatcher.dispatch(build_id).await {
                warn!("Failed to dispatch build {build_id}: {e}");
            }
        }

        info!("Dispatched {} builds: {selected:?}", selected.len());
        Ok(selected)
    }
}
