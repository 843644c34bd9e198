use thiserror::Error;

#[derive(Error, Debug)]
pub enum FailTrackError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("You have to provide a build id")]
    MissingBuildId,

    #[error("Invalid build id: {0:?}")]
    InvalidBuildId(String),

    #[error(
        "No scanned builds found in the trailing window; seed the scan log first (failtrack seed <BUILD_ID>)"
    )]
    NoScanHistory,

    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FailTrackError {
    /// Errors caused by the caller's input rather than by a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingBuildId | Self::InvalidBuildId(_))
    }
}

pub type Result<T> = std::result::Result<T, FailTrackError>;
