//! Queue client facade and the provider seam it forwards to.

use crate::error::QueueError;
use crate::message::{
    DequeueOutcome, EnqueueOptions, EnqueuedMessage, Metadata, MessageId, PeekedMessage,
    PopReceipt, QueueCreation, QueueName, QueueProperties, ReceivedMessage,
};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{AzureStorageQueueProvider, InMemoryProvider};
use crate::StorageAccountConfig;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Remote queue operations, one method per service call
///
/// Implementations perform no retries and no local validation; every
/// failure is reported as a [`QueueError`].
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Create the queue if it does not exist
    async fn create_queue(
        &self,
        queue: &QueueName,
        metadata: &Metadata,
    ) -> Result<QueueCreation, QueueError>;

    /// Delete the queue and all of its messages
    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError>;

    /// Read approximate message count and metadata
    async fn get_queue_properties(&self, queue: &QueueName)
        -> Result<QueueProperties, QueueError>;

    /// Add a message to the back of the queue
    async fn put_message(
        &self,
        queue: &QueueName,
        body: &str,
        options: &EnqueueOptions,
    ) -> Result<EnqueuedMessage, QueueError>;

    /// Read up to `count` messages without leasing them
    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError>;

    /// Lease up to `count` messages, hiding them for the visibility timeout
    async fn get_messages(
        &self,
        queue: &QueueName,
        count: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Delete one leased message
    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Client bound to a single storage queue
///
/// Every operation except [`delete_queue`](Self::delete_queue) first makes
/// sure the queue exists, so callers never need a separate setup step.
/// The client holds no mutable state and can be cloned and shared freely.
#[derive(Clone)]
pub struct StorageQueueClient {
    provider: Arc<dyn QueueProvider>,
    queue: QueueName,
}

impl std::fmt::Debug for StorageQueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageQueueClient")
            .field("queue", &self.queue)
            .field("provider", &self.provider.provider_type())
            .finish()
    }
}

impl StorageQueueClient {
    /// Create a client for `queue` on top of a provider
    pub fn new(provider: Arc<dyn QueueProvider>, queue: QueueName) -> Self {
        Self { provider, queue }
    }

    /// Create a client for a storage account given as a connection string
    ///
    /// # Example
    ///
    /// ```no_run
    /// use storage_queue::StorageQueueClient;
    ///
    /// # async fn example() -> Result<(), storage_queue::QueueError> {
    /// let client = StorageQueueClient::from_connection_string(
    ///     "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
    ///     "orders",
    /// )?;
    ///
    /// client.enqueue("hello").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_connection_string(
        connection_string: &str,
        queue_name: &str,
    ) -> Result<Self, QueueError> {
        let account = StorageAccountConfig::from_connection_string(connection_string)?;
        let queue = QueueName::new(queue_name.to_string())?;
        let provider = AzureStorageQueueProvider::new(account)?;
        Ok(Self::new(Arc::new(provider), queue))
    }

    /// Name of the queue this client targets
    pub fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    /// Get provider type
    pub fn provider_type(&self) -> ProviderType {
        self.provider.provider_type()
    }

    /// Create the queue if absent
    ///
    /// Succeeds whether the queue was created by this call or already
    /// existed. Metadata is only applied when the queue is created. Metadata
    /// keys are case-insensitive; the storage service reports them back
    /// lowercased.
    pub async fn ensure_queue_exists(
        &self,
        metadata: &Metadata,
    ) -> Result<QueueCreation, QueueError> {
        let creation = self
            .observe(
                "create_queue",
                self.provider.create_queue(&self.queue, metadata).await,
            )?;

        if creation.is_created() {
            info!(queue = %self.queue, "Created queue");
        } else {
            debug!(queue = %self.queue, "Queue already exists");
        }

        Ok(creation)
    }

    /// Add a message with service-default visibility and lifetime
    pub async fn enqueue(&self, body: &str) -> Result<EnqueuedMessage, QueueError> {
        self.enqueue_with(body, EnqueueOptions::default()).await
    }

    /// Add a message with explicit visibility delay and/or time-to-live
    pub async fn enqueue_with(
        &self,
        body: &str,
        options: EnqueueOptions,
    ) -> Result<EnqueuedMessage, QueueError> {
        self.ensure_exists().await?;

        let enqueued = self.observe(
            "put_message",
            self.provider.put_message(&self.queue, body, &options).await,
        )?;

        debug!(
            queue = %self.queue,
            message_id = %enqueued.message_id,
            "Enqueued message"
        );
        Ok(enqueued)
    }

    /// Approximate number of messages in the queue
    ///
    /// The count is estimated by the service and is eventually consistent.
    /// It includes leased messages and may lag recent enqueues and deletes,
    /// so treat it as advisory.
    pub async fn approximate_length(&self) -> Result<u64, QueueError> {
        Ok(self.properties().await?.approximate_message_count)
    }

    /// Alias of [`approximate_length`](Self::approximate_length)
    ///
    /// Both accessors share one code path and always agree.
    pub async fn queue_length(&self) -> Result<u64, QueueError> {
        self.approximate_length().await
    }

    /// Approximate message count together with the queue's metadata
    pub async fn properties(&self) -> Result<QueueProperties, QueueError> {
        self.ensure_exists().await?;

        self.observe(
            "get_queue_properties",
            self.provider.get_queue_properties(&self.queue).await,
        )
    }

    /// Look at up to `count` messages from the front without leasing them
    pub async fn peek(&self, count: u32) -> Result<Vec<PeekedMessage>, QueueError> {
        self.ensure_exists().await?;

        self.observe(
            "peek_messages",
            self.provider.peek_messages(&self.queue, count).await,
        )
    }

    /// Peek a single message
    pub async fn peek_one(&self) -> Result<Option<PeekedMessage>, QueueError> {
        Ok(self.peek(1).await?.into_iter().next())
    }

    /// Lease up to `count` messages using the service's default visibility
    /// timeout
    ///
    /// An empty queue yields `Ok` with an empty vector; failures are always
    /// `Err`.
    pub async fn list(&self, count: u32) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receive(count, None).await
    }

    /// Lease a single message
    pub async fn list_one(&self) -> Result<Option<ReceivedMessage>, QueueError> {
        Ok(self.list(1).await?.into_iter().next())
    }

    /// Lease up to `count` messages, hidden from other readers for
    /// `visibility_timeout`
    pub async fn list_with_visibility(
        &self,
        count: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.receive(count, Some(visibility_timeout)).await
    }

    /// Delete a leased message
    ///
    /// Fails with [`QueueError::MessageNotFound`] when the pop receipt is
    /// stale: the lease expired, the message was read again, or it was
    /// already deleted.
    pub async fn dequeue(
        &self,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        self.ensure_exists().await?;

        self.observe(
            "delete_message",
            self.provider
                .delete_message(&self.queue, message_id, pop_receipt)
                .await,
        )?;

        debug!(queue = %self.queue, message_id = %message_id, "Deleted message");
        Ok(())
    }

    /// Lease the next message and delete it
    ///
    /// Returns [`DequeueOutcome::Empty`] when no message is visible.
    pub async fn dequeue_next(&self) -> Result<DequeueOutcome, QueueError> {
        self.ensure_exists().await?;

        let next = self
            .observe(
                "get_messages",
                self.provider.get_messages(&self.queue, 1, None).await,
            )?
            .into_iter()
            .next();

        let Some(message) = next else {
            debug!(queue = %self.queue, "No message to dequeue");
            return Ok(DequeueOutcome::Empty);
        };

        self.observe(
            "delete_message",
            self.provider
                .delete_message(&self.queue, &message.message_id, &message.pop_receipt)
                .await,
        )?;

        debug!(
            queue = %self.queue,
            message_id = %message.message_id,
            "Dequeued message"
        );
        Ok(DequeueOutcome::Deleted(message))
    }

    /// Delete the queue
    ///
    /// Does not create the queue first; deleting a queue that does not exist
    /// fails with [`QueueError::QueueNotFound`].
    pub async fn delete_queue(&self) -> Result<(), QueueError> {
        self.observe(
            "delete_queue",
            self.provider.delete_queue(&self.queue).await,
        )?;

        info!(queue = %self.queue, "Deleted queue");
        Ok(())
    }

    async fn ensure_exists(&self) -> Result<(), QueueError> {
        self.ensure_queue_exists(&Metadata::new()).await.map(|_| ())
    }

    async fn receive(
        &self,
        count: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.ensure_exists().await?;

        self.observe(
            "get_messages",
            self.provider
                .get_messages(&self.queue, count, visibility_timeout)
                .await,
        )
    }

    /// Emit a diagnostic event for a failed remote call
    fn observe<T>(
        &self,
        operation: &'static str,
        result: Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        if let Err(ref e) = result {
            warn!(
                queue = %self.queue,
                operation = operation,
                code = e.code(),
                transient = e.is_transient(),
                error = %e.message(),
                "Queue operation failed"
            );
        }

        result
    }
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Create queue client from configuration
    pub fn create_client(config: QueueConfig) -> Result<StorageQueueClient, QueueError> {
        let queue = QueueName::new(config.queue_name)?;

        let provider: Arc<dyn QueueProvider> = match config.provider {
            ProviderConfig::AzureStorage(account) => {
                Arc::new(AzureStorageQueueProvider::new(account)?)
            }
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryProvider::new(in_memory_config))
            }
        };

        Ok(StorageQueueClient::new(provider, queue))
    }

    /// Create test client with in-memory provider
    pub fn create_test_client(queue: QueueName) -> StorageQueueClient {
        let provider = InMemoryProvider::new(InMemoryConfig::default());
        StorageQueueClient::new(Arc::new(provider), queue)
    }
}
