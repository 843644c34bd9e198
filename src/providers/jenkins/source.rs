use async_trait::async_trait;
use log::{debug, warn};

use super::client::{JenkinsBuildDto, JenkinsCaseDto, JenkinsClient};
use crate::error::Result;
use crate::models::{BuildId, BuildInfo, ReportedCase};
use crate::providers::CiSource;

impl From<JenkinsCaseDto> for ReportedCase {
    fn from(dto: JenkinsCaseDto) -> Self {
        Self {
            class_name: dto.class_name,
            name: dto.name,
            status: dto.status,
            duration: dto.duration,
            error_details: dto.error_details,
            error_stack_trace: dto.error_stack_trace,
            skipped: dto.skipped,
            skipped_message: dto.skipped_message,
        }
    }
}

fn to_build_info(requested: BuildId, dto: JenkinsBuildDto) -> BuildInfo {
    let id = dto.id.parse().unwrap_or_else(|_| {
        warn!("Build {requested} reported non-numeric id {:?}", dto.id);
        requested
    });

    BuildInfo {
        id,
        timestamp: dto.timestamp,
        result: dto.result,
    }
}

#[async_trait]
impl CiSource for JenkinsClient {
    async fn completed_builds(&self) -> Result<Vec<BuildId>> {
        let job = self.fetch_job().await?;
        let builds = job.completed_build_ids();
        debug!("Jenkins reported {} completed builds", builds.len());
        Ok(builds)
    }

    async fn build_info(&self, build_id: BuildId) -> Result<BuildInfo> {
        let dto = self.fetch_build(build_id).await?;
        Ok(to_build_info(build_id, dto))
    }

    async fn failing_cases(&self, build_id: BuildId) -> Result<Vec<ReportedCase>> {
        let cases = self.fetch_failing_cases(build_id).await?;
        Ok(cases.into_iter().map(ReportedCase::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_build_info_parses_id() {
        let info = to_build_info(
            7,
            JenkinsBuildDto {
                id: "8".to_string(),
                timestamp: 5,
                result: Some("SUCCESS".to_string()),
            },
        );

        assert_eq!(info.id, 8);
        assert_eq!(info.timestamp, 5);
    }

    #[test]
    fn test_to_build_info_falls_back_to_requested_id() {
        let info = to_build_info(
            7,
            JenkinsBuildDto {
                id: "2024-01-01_10-00-00".to_string(),
                timestamp: 5,
                result: None,
            },
        );

        assert_eq!(info.id, 7);
        assert_eq!(info.result, None);
    }

    #[tokio::test]
    async fn test_completed_builds_through_trait() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/json")
            .with_status(200)
            .with_body(
                r#"{"lastCompletedBuild": {"number": 12}, "builds": [{"number": 13}, {"number": 12}, {"number": 11}]}"#,
            )
            .create_async()
            .await;

        let client = JenkinsClient::new(&server.url(), None).unwrap();
        let source: &dyn CiSource = &client;

        assert_eq!(source.completed_builds().await.unwrap(), vec![12, 11]);
    }
}
