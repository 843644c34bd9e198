pub mod jenkins;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BuildId, BuildInfo, ReportedCase};

/// Read-only view of a CI server.
#[async_trait]
pub trait CiSource: Send + Sync {
    /// Completed build ids, most recent first.
    async fn completed_builds(&self) -> Result<Vec<BuildId>>;

    async fn build_info(&self, build_id: BuildId) -> Result<BuildInfo>;

    /// Non-passing test cases of a build.
    async fn failing_cases(&self, build_id: BuildId) -> Result<Vec<ReportedCase>>;
}
