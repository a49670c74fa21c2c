//! Provider types and configuration.

use crate::error::ConfigurationError;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account name of the local storage emulator
pub const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known, publicly documented key of the local storage emulator
pub const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const DEVELOPMENT_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureStorage,
    InMemory,
}

/// How message text is placed on the wire
///
/// `Plain` sends the body as XML-escaped text. `Base64` encodes it first,
/// which is what most other storage SDKs expect to find in the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageEncoding {
    #[default]
    Plain,
    Base64,
}

/// Configuration for queue client initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub provider: ProviderConfig,
    pub queue_name: String,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderConfig {
    AzureStorage(StorageAccountConfig),
    InMemory(InMemoryConfig),
}

/// Connection settings for a storage account
///
/// Built explicitly by the caller, either field by field or from a
/// connection string. The library never reads the process environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageAccountConfig {
    pub account_name: String,
    pub account_key: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_endpoint_suffix")]
    pub endpoint_suffix: String,
    /// Full queue service URL; overrides protocol/account/suffix when set
    #[serde(default)]
    pub queue_endpoint: Option<String>,
    #[serde(default)]
    pub message_encoding: MessageEncoding,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_endpoint_suffix() -> String {
    "core.windows.net".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl StorageAccountConfig {
    /// Create configuration for a public-cloud account
    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: account_key.into(),
            protocol: default_protocol(),
            endpoint_suffix: default_endpoint_suffix(),
            queue_endpoint: None,
            message_encoding: MessageEncoding::default(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Configuration for the local storage emulator
    pub fn development_storage() -> Self {
        Self::new(DEVELOPMENT_ACCOUNT_NAME, DEVELOPMENT_ACCOUNT_KEY)
            .with_protocol("http")
            .with_queue_endpoint(DEVELOPMENT_QUEUE_ENDPOINT)
    }

    /// Parse a storage connection string
    ///
    /// Recognises `DefaultEndpointsProtocol`, `AccountName`, `AccountKey`,
    /// `EndpointSuffix`, `QueueEndpoint` and `UseDevelopmentStorage=true`.
    /// Settings for other services (blob, table, file) are ignored.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, ConfigurationError> {
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut queue_endpoint = None;
        let mut development = false;

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (key, value) =
                segment
                    .split_once('=')
                    .ok_or_else(|| ConfigurationError::ConnectionString {
                        message: "every segment must be a key=value pair".to_string(),
                    })?;
            let value = value.trim().to_string();

            match key.trim().to_ascii_lowercase().as_str() {
                "defaultendpointsprotocol" => protocol = Some(value),
                "accountname" => account_name = Some(value),
                "accountkey" => account_key = Some(value),
                "endpointsuffix" => endpoint_suffix = Some(value),
                "queueendpoint" => queue_endpoint = Some(value),
                "usedevelopmentstorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            return Ok(Self::development_storage());
        }

        let account_name = account_name.ok_or_else(|| ConfigurationError::Missing {
            key: "AccountName".to_string(),
        })?;
        let account_key = account_key.ok_or_else(|| ConfigurationError::Missing {
            key: "AccountKey".to_string(),
        })?;

        let mut config = Self::new(account_name, account_key);
        if let Some(protocol) = protocol {
            config.protocol = protocol;
        }
        if let Some(suffix) = endpoint_suffix {
            config.endpoint_suffix = suffix;
        }
        config.queue_endpoint = queue_endpoint;

        config.validate()?;
        Ok(config)
    }

    /// Set the endpoint protocol (`https` or `http`)
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the DNS suffix used to build the service endpoint
    pub fn with_endpoint_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.endpoint_suffix = suffix.into();
        self
    }

    /// Use an explicit queue service URL
    pub fn with_queue_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.queue_endpoint = Some(endpoint.into());
        self
    }

    /// Set how message text is encoded on the wire
    pub fn with_message_encoding(mut self, encoding: MessageEncoding) -> Self {
        self.message_encoding = encoding;
        self
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout_seconds(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Resolved queue service base URL, without a trailing slash
    pub fn queue_endpoint(&self) -> String {
        match &self.queue_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!(
                "{}://{}.queue.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            ),
        }
    }

    /// Connection string equivalent to this configuration
    pub fn connection_string(&self) -> String {
        let mut value = format!(
            "DefaultEndpointsProtocol={};AccountName={};AccountKey={};EndpointSuffix={}",
            self.protocol, self.account_name, self.account_key, self.endpoint_suffix
        );
        if let Some(endpoint) = &self.queue_endpoint {
            value.push_str(";QueueEndpoint=");
            value.push_str(endpoint);
        }
        value
    }

    /// Check that the configuration can sign requests
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.account_name.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "account_name".to_string(),
            });
        }

        if self.account_key.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "account_key".to_string(),
            });
        }

        if STANDARD.decode(self.account_key.trim()).is_err() {
            return Err(ConfigurationError::Invalid {
                message: "account key is not valid base64".to_string(),
            });
        }

        if self.queue_endpoint.is_none() && !matches!(self.protocol.as_str(), "http" | "https") {
            return Err(ConfigurationError::Invalid {
                message: format!("unsupported protocol '{}'", self.protocol),
            });
        }

        if let Some(endpoint) = &self.queue_endpoint {
            url::Url::parse(endpoint).map_err(|e| ConfigurationError::Invalid {
                message: format!("queue endpoint '{}' is not a URL: {}", endpoint, e),
            })?;
        }

        Ok(())
    }
}

impl fmt::Debug for StorageAccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccountConfig")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("protocol", &self.protocol)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("queue_endpoint", &self.queue_endpoint)
            .field("message_encoding", &self.message_encoding)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    pub default_visibility_timeout_seconds: i64,
    pub default_message_ttl_seconds: i64,
}

impl InMemoryConfig {
    /// Lease length applied when a read does not ask for one
    pub fn default_visibility_timeout(&self) -> Duration {
        Duration::seconds(self.default_visibility_timeout_seconds)
    }

    /// Lifetime applied when an enqueue does not ask for one
    pub fn default_message_ttl(&self) -> Duration {
        Duration::seconds(self.default_message_ttl_seconds)
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            default_visibility_timeout_seconds: 30,
            default_message_ttl_seconds: 7 * 24 * 60 * 60,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
