use reqwest::Client;
use url::Url;

use crate::auth::Credentials;
use crate::error::{FailTrackError, Result};
use crate::models::BuildId;

pub struct JenkinsClient {
    pub client: Client,
    pub job_url: Url,
    pub credentials: Option<Credentials>,
}

impl JenkinsClient {
    /// `job_url` points at a Jenkins job, e.g. `https://ci.example.com/job/app/job/master`.
    pub fn new(job_url: &str, credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("failtrack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FailTrackError::Config(format!("Failed to create HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash
        let normalized = format!("{}/", job_url.trim_end_matches('/'));
        let job_url = Url::parse(&normalized)
            .map_err(|e| FailTrackError::Config(format!("Invalid Jenkins job URL: {e}")))?;

        Ok(Self {
            client,
            job_url,
            credentials,
        })
    }

    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(credentials) => credentials.apply(request),
            None => request,
        }
    }

    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.job_url
            .join(path)
            .map_err(|e| FailTrackError::Config(format!("Invalid Jenkins URL for {path}: {e}")))
    }

    pub fn build_url(&self, build_id: BuildId, path: &str) -> Result<Url> {
        self.api_url(&format!("{build_id}/{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_appends_trailing_slash() {
        let client = JenkinsClient::new("https://ci.example.com/job/app/job/master", None).unwrap();

        assert_eq!(
            client.job_url.as_str(),
            "https://ci.example.com/job/app/job/master/"
        );
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = JenkinsClient::new("not a url", None);

        assert!(matches!(result, Err(FailTrackError::Config(_))));
    }

    #[test]
    fn test_build_url() {
        let client = JenkinsClient::new("https://ci.example.com/job/app/", None).unwrap();
        let url = client.build_url(42, "testReport/api/json").unwrap();

        assert_eq!(
            url.as_str(),
            "https://ci.example.com/job/app/42/testReport/api/json"
        );
    }
}
