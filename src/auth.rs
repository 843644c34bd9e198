use std::fmt;

use reqwest::RequestBuilder;

/// Basic-auth credentials for the CI server. The password is an API token
/// in most Jenkins setups and never shows up in `Debug` output.
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Builds credentials only when a username is configured.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        let username = username.filter(|u| !u.is_empty())?;

        Some(Self {
            username: username.to_owned(),
            password: password.unwrap_or_default().to_owned(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Adds the `Authorization: Basic` header to `request`.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &format_args!("<redacted>"))
            .finish()
    }
}
