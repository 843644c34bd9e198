mod builds;
mod core;

pub use self::core::JenkinsClient;
pub use builds::{JenkinsBuildDto, JenkinsCaseDto};
