//! # Storage Queue
//!
//! Thin client facade over Azure Storage Queues.
//!
//! This library provides:
//! - A [`StorageQueueClient`] bound to one queue that creates the queue on
//!   first use
//! - Enqueue, peek, lease (list) and delete-by-receipt operations
//! - Approximate queue length and metadata
//! - A single [`QueueError`] type for every failure, carrying the service's
//!   error code and message
//! - An in-memory provider for tests
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Identifiers, message structures and operation outcomes
//! - [`provider`] - Provider types and account configuration
//! - [`client`] - The provider trait, the client facade and its factory
//! - [`providers`] - Storage REST API and in-memory providers
//!
//! ## Example
//!
//! ```no_run
//! use storage_queue::{DequeueOutcome, StorageAccountConfig, QueueClientFactory, QueueConfig, ProviderConfig};
//!
//! # async fn example() -> Result<(), storage_queue::QueueError> {
//! let client = QueueClientFactory::create_client(QueueConfig {
//!     provider: ProviderConfig::AzureStorage(StorageAccountConfig::development_storage()),
//!     queue_name: "orders".to_string(),
//! })?;
//!
//! client.enqueue("order-42").await?;
//!
//! if let DequeueOutcome::Deleted(message) = client.dequeue_next().await? {
//!     println!("processed {}", message.body);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClientFactory, QueueProvider, StorageQueueClient};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    DequeueOutcome, EnqueueOptions, EnqueuedMessage, Metadata, MessageId, PeekedMessage,
    PopReceipt, QueueCreation, QueueName, QueueProperties, ReceivedMessage, Timestamp,
};
pub use provider::{
    InMemoryConfig, MessageEncoding, ProviderConfig, ProviderType, QueueConfig,
    StorageAccountConfig, DEVELOPMENT_ACCOUNT_KEY, DEVELOPMENT_ACCOUNT_NAME,
};
pub use providers::{AzureStorageQueueProvider, InMemoryProvider};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
