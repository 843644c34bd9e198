use serde::Deserialize;

use super::core::JenkinsClient;
use crate::error::{FailTrackError, Result};
use crate::models::BuildId;

const TEST_REPORT_TREE: &str = "suites[cases[className,name,status,duration,errorDetails,errorStackTrace,skipped,skippedMessage]]";

#[derive(Debug, Deserialize)]
pub struct JenkinsBuildRefDto {
    pub number: BuildId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsJobDto {
    pub last_completed_build: Option<JenkinsBuildRefDto>,
    #[serde(default)]
    pub builds: Vec<JenkinsBuildRefDto>,
}

impl JenkinsJobDto {
    /// Build ids up to the last completed one, in server order.
    pub fn completed_build_ids(&self) -> Vec<BuildId> {
        let Some(last_completed) = &self.last_completed_build else {
            return Vec::new();
        };

        self.builds
            .iter()
            .map(|b| b.number)
            .filter(|n| *n <= last_completed.number)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct JenkinsBuildDto {
    pub id: String,
    pub timestamp: i64,
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsCaseDto {
    pub class_name: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub duration: f64,
    pub error_details: Option<String>,
    pub error_stack_trace: Option<String>,
    #[serde(default)]
    pub skipped: bool,
    pub skipped_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JenkinsSuiteDto {
    #[serde(default)]
    cases: Vec<JenkinsCaseDto>,
}

#[derive(Debug, Deserialize)]
struct JenkinsTestReportDto {
    #[serde(default)]
    suites: Vec<JenkinsSuiteDto>,
}

impl JenkinsClient {
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.auth_request(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let url = response.url().clone();
            return Err(FailTrackError::Api(format!(
                "Jenkins returned {status} for {url}"
            )));
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn fetch_job(&self) -> Result<JenkinsJobDto> {
        let url = self.api_url("api/json")?;
        self.get_json(self.client.get(url)).await
    }

    pub async fn fetch_build(&self, build_id: BuildId) -> Result<JenkinsBuildDto> {
        let url = self.build_url(build_id, "api/json")?;
        self.get_json(self.client.get(url)).await
    }

    /// Fetch the cases of a build's test report that did not pass
    pub async fn fetch_failing_cases(&self, build_id: BuildId) -> Result<Vec<JenkinsCaseDto>> {
        let url = self.build_url(build_id, "testReport/api/json")?;
        let request = self.client.get(url).query(&[("tree", TEST_REPORT_TREE)]);

        let report: JenkinsTestReportDto = self.get_json(request).await?;

        Ok(report
            .suites
            .into_iter()
            .flat_map(|suite| suite.cases)
            .filter(|case| case.status != "PASSED")
            .collect())
    }
}
