use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// Connection settings for a [`CatalogClient`](crate::CatalogClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Start building a config for the catalog at `endpoint`.
    pub fn build(endpoint: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            endpoint: endpoint.into(),
            username: None,
            password: None,
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_base_delay: Self::DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ClientConfigBuilder {
    /// Authenticate with HTTP basic auth. An empty password is sent as no password.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into()).filter(|p| !p.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        let mut endpoint = Url::parse(self.endpoint.trim())?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::InvalidConfiguration(format!(
                "catalog endpoint must be http(s), got '{endpoint}'"
            )));
        }
        // relative joins must land under the endpoint, not replace its last segment
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        Ok(ClientConfig {
            endpoint,
            username: self.username,
            password: self.password,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
        })
    }
}
