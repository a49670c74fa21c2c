//! # Storage Queue CLI
//!
//! Command-line interface for Azure Storage Queues.
//!
//! Every client operation is exposed as a subcommand; results are written to
//! stdout as JSON and logs go to stderr.

use chrono::Duration;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage_queue::{
    AzureStorageQueueProvider, ConfigurationError, EnqueueOptions, MessageEncoding, MessageId,
    Metadata, PopReceipt, QueueError, QueueName, StorageAccountConfig, StorageQueueClient,
    ValidationError,
};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "storage-queue";

/// Prefix for configuration environment variables
pub const ENV_PREFIX: &str = "STORAGE_QUEUE";

// ============================================================================
// CLI Structure
// ============================================================================

/// Storage Queue CLI - work with Azure Storage Queues from the shell
#[derive(Parser)]
#[command(name = "storage-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Enqueue, inspect and consume Azure Storage Queue messages")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "STORAGE_QUEUE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage account connection string
    #[arg(long, env = "AZURE_STORAGE_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Storage account name
    #[arg(long, env = "AZURE_QUEUE_ACCOUNT_NAME")]
    pub account_name: Option<String>,

    /// Storage account key (base64)
    #[arg(long, env = "AZURE_QUEUE_ACCOUNT_KEY", hide_env_values = true)]
    pub account_key: Option<String>,

    /// DNS suffix of the storage service
    #[arg(long)]
    pub endpoint_suffix: Option<String>,

    /// Explicit queue service URL
    #[arg(long)]
    pub queue_endpoint: Option<String>,

    /// Base64-encode message bodies on the wire
    #[arg(long)]
    pub base64: bool,

    /// Queue to operate on
    #[arg(short, long)]
    pub queue: Option<String>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Create the queue if it does not exist
    Create {
        /// Metadata applied when the queue is created (key=value)
        #[arg(short, long = "metadata", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },

    /// Add a message to the queue
    Enqueue {
        /// Message body
        body: String,

        /// Seconds before the message becomes visible
        #[arg(long)]
        visibility_delay: Option<i64>,

        /// Seconds the message lives before it expires
        #[arg(long)]
        ttl: Option<i64>,
    },

    /// Show the approximate number of messages
    Length,

    /// Show approximate message count and metadata
    Properties,

    /// Look at messages without leasing them
    Peek {
        /// Number of messages
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Lease messages, hiding them from other readers
    List {
        /// Number of messages
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Seconds the leased messages stay hidden
        #[arg(long)]
        visibility_timeout: Option<i64>,
    },

    /// Delete a leased message
    Dequeue {
        /// Message identifier
        message_id: String,

        /// Pop receipt from the read that leased the message
        pop_receipt: String,
    },

    /// Lease the next message and delete it
    DequeueNext,

    /// Delete the queue and all of its messages
    DeleteQueue,
}

/// Parse a `key=value` pair
fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), val.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", value)),
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Logging setup failed: {message}")]
    Logging { message: String },

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid account settings: {0}")]
    Account(#[from] ConfigurationError),

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Resolved CLI configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Queue to operate on
    pub queue: Option<String>,

    /// Storage account settings
    pub account: AccountSettings,
}

/// Storage account settings as read from files, environment and flags
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountSettings {
    pub connection_string: Option<String>,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub endpoint_suffix: Option<String>,
    pub queue_endpoint: Option<String>,
    pub message_encoding: MessageEncoding,
    pub request_timeout_seconds: Option<u64>,
}

impl std::fmt::Debug for AccountSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSettings")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("queue_endpoint", &self.queue_endpoint)
            .field("message_encoding", &self.message_encoding)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl CliConfig {
    /// Apply command-line flags on top of file and environment settings
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(queue) = &cli.queue {
            self.queue = Some(queue.clone());
        }
        if let Some(value) = &cli.connection_string {
            self.account.connection_string = Some(value.clone());
        }
        if let Some(value) = &cli.account_name {
            self.account.account_name = Some(value.clone());
        }
        if let Some(value) = &cli.account_key {
            self.account.account_key = Some(value.clone());
        }
        if let Some(value) = &cli.endpoint_suffix {
            self.account.endpoint_suffix = Some(value.clone());
        }
        if let Some(value) = &cli.queue_endpoint {
            self.account.queue_endpoint = Some(value.clone());
        }
        if cli.base64 {
            self.account.message_encoding = MessageEncoding::Base64;
        }
        self
    }

    /// Queue name to operate on
    pub fn queue_name(&self) -> Result<QueueName, ConfigError> {
        let name = self.queue.clone().ok_or_else(|| ConfigError::MissingRequired {
            key: "queue".to_string(),
        })?;

        QueueName::new(name).map_err(|_| ConfigError::MissingRequired {
            key: "queue".to_string(),
        })
    }

    /// Build account configuration, preferring a connection string over an
    /// account name and key
    pub fn storage_account(&self) -> Result<StorageAccountConfig, ConfigError> {
        let settings = &self.account;

        let mut account = match (
            &settings.connection_string,
            &settings.account_name,
            &settings.account_key,
        ) {
            (Some(connection_string), _, _) => {
                StorageAccountConfig::from_connection_string(connection_string)?
            }
            (None, Some(name), Some(key)) => StorageAccountConfig::new(name, key),
            (None, None, _) => {
                return Err(ConfigError::MissingRequired {
                    key: "account.account_name".to_string(),
                })
            }
            (None, Some(_), None) => {
                return Err(ConfigError::MissingRequired {
                    key: "account.account_key".to_string(),
                })
            }
        };

        if let Some(suffix) = &settings.endpoint_suffix {
            account = account.with_endpoint_suffix(suffix);
        }
        if let Some(endpoint) = &settings.queue_endpoint {
            account = account.with_queue_endpoint(endpoint);
        }
        if let Some(seconds) = settings.request_timeout_seconds {
            account = account.with_request_timeout_seconds(seconds);
        }
        account = account.with_message_encoding(settings.message_encoding);

        account.validate()?;
        Ok(account)
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments, run one command and print its JSON result
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = load_configuration(cli.config.as_deref())?.with_overrides(&cli);
    debug!(config = ?config, "Resolved configuration");

    let client = build_client(&config)?;
    let output = execute_command(&client, cli.command).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Install the tracing subscriber writing to stderr
///
/// `RUST_LOG` takes precedence over `--log-level`.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| invalid_argument("log-level", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Load configuration from files and the environment
///
/// Later sources override earlier ones: `storage-queue.{toml,yaml,json}` in
/// the working directory, the explicit file, then `STORAGE_QUEUE__*`
/// environment variables.
pub fn load_configuration(config_path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false));

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    Ok(config.try_deserialize::<CliConfig>()?)
}

/// Create a client for the configured account and queue
pub fn build_client(config: &CliConfig) -> Result<StorageQueueClient, CliError> {
    let queue = config.queue_name()?;
    let account = config.storage_account()?;
    let provider = AzureStorageQueueProvider::new(account).map_err(ConfigError::from)?;

    Ok(StorageQueueClient::new(Arc::new(provider), queue))
}

// ============================================================================
// Command Implementations
// ============================================================================

fn invalid_argument(arg: &str, error: impl std::fmt::Display) -> CliError {
    CliError::InvalidArgument {
        arg: arg.to_string(),
        message: error.to_string(),
    }
}

fn seconds(arg: &str, value: i64) -> Result<Duration, CliError> {
    Duration::try_seconds(value)
        .ok_or_else(|| invalid_argument(arg, format!("{} seconds is out of range", value)))
}

/// Run one command against the client, returning its JSON result
pub async fn execute_command(
    client: &StorageQueueClient,
    command: Commands,
) -> Result<Value, CliError> {
    let queue = client.queue_name().to_string();

    let output = match command {
        Commands::Create { metadata } => {
            let metadata: Metadata = metadata.into_iter().collect();
            let creation = client.ensure_queue_exists(&metadata).await?;
            json!({ "queue": queue, "created": creation.is_created() })
        }
        Commands::Enqueue {
            body,
            visibility_delay,
            ttl,
        } => {
            let mut options = EnqueueOptions::new();
            if let Some(delay) = visibility_delay {
                options = options.with_visibility_delay(seconds("visibility-delay", delay)?);
            }
            if let Some(ttl) = ttl {
                options = options.with_time_to_live(seconds("ttl", ttl)?);
            }
            serde_json::to_value(client.enqueue_with(&body, options).await?)?
        }
        Commands::Length => {
            let length = client.approximate_length().await?;
            json!({ "queue": queue, "approximate_length": length })
        }
        Commands::Properties => serde_json::to_value(client.properties().await?)?,
        Commands::Peek { count } => serde_json::to_value(client.peek(count).await?)?,
        Commands::List {
            count,
            visibility_timeout,
        } => {
            let messages = match visibility_timeout {
                Some(timeout) => {
                    client
                        .list_with_visibility(count, seconds("visibility-timeout", timeout)?)
                        .await?
                }
                None => client.list(count).await?,
            };
            serde_json::to_value(messages)?
        }
        Commands::Dequeue {
            message_id,
            pop_receipt,
        } => {
            let id: MessageId = message_id
                .parse()
                .map_err(|e: ValidationError| invalid_argument("message-id", e))?;
            let receipt: PopReceipt = pop_receipt
                .parse()
                .map_err(|e: ValidationError| invalid_argument("pop-receipt", e))?;

            client.dequeue(&id, &receipt).await?;
            json!({ "queue": queue, "message_id": message_id, "deleted": true })
        }
        Commands::DequeueNext => {
            let message = client.dequeue_next().await?.into_message();
            json!({ "queue": queue, "message": message })
        }
        Commands::DeleteQueue => {
            client.delete_queue().await?;
            json!({ "queue": queue, "deleted": true })
        }
    };

    Ok(output)
}
