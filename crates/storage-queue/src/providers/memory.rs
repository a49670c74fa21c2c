//! In-memory queue provider implementation for testing and development.
//!
//! Mirrors the observable contract of the storage service: queues must be
//! created before use, reads lease messages for a visibility timeout, every
//! read issues a fresh pop receipt, and deletes must present the receipt of
//! the latest read. Message lifetime (TTL) and approximate counts are
//! simulated as well.

use crate::client::QueueProvider;
use crate::error::{QueueError, ValidationError};
use crate::message::{
    EnqueueOptions, EnqueuedMessage, Metadata, MessageId, PeekedMessage, PopReceipt,
    QueueCreation, QueueName, QueueProperties, ReceivedMessage, Timestamp,
};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    fn queue_mut(&mut self, queue_name: &QueueName) -> Result<&mut InMemoryQueue, QueueError> {
        self.queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue_name.to_string(),
            })
    }
}

/// Internal state for a single queue
struct InMemoryQueue {
    metadata: Metadata,
    /// Messages in insertion order, visible and leased alike
    messages: VecDeque<StoredMessage>,
}

impl InMemoryQueue {
    fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            messages: VecDeque::new(),
        }
    }

    /// Drop messages whose time-to-live has passed
    fn purge_expired(&mut self, now: &Timestamp) {
        self.messages.retain(|m| !m.is_expired(now));
    }

    fn visible(&mut self, now: &Timestamp) -> impl Iterator<Item = &mut StoredMessage> {
        let now = now.clone();
        self.messages
            .iter_mut()
            .filter(move |m| m.is_visible(&now))
    }
}

/// A message stored in the queue with its lease state
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    insertion_time: Timestamp,
    expiration_time: Timestamp,
    time_next_visible: Timestamp,
    dequeue_count: u32,
    /// Receipt of the most recent put or read; the only one a delete accepts
    pop_receipt: PopReceipt,
}

impl StoredMessage {
    fn is_expired(&self, now: &Timestamp) -> bool {
        *now >= self.expiration_time
    }

    fn is_visible(&self, now: &Timestamp) -> bool {
        *now >= self.time_next_visible
    }

    fn to_peeked(&self) -> PeekedMessage {
        PeekedMessage {
            message_id: self.message_id.clone(),
            body: self.body.clone(),
            insertion_time: self.insertion_time.clone(),
            expiration_time: self.expiration_time.clone(),
            dequeue_count: self.dequeue_count,
        }
    }

    fn to_received(&self) -> ReceivedMessage {
        ReceivedMessage {
            message_id: self.message_id.clone(),
            pop_receipt: self.pop_receipt.clone(),
            body: self.body.clone(),
            insertion_time: self.insertion_time.clone(),
            expiration_time: self.expiration_time.clone(),
            time_next_visible: self.time_next_visible.clone(),
            dequeue_count: self.dequeue_count,
        }
    }
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider
///
/// Cloning shares the underlying storage, so clones observe each other's
/// queues and messages.
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with the given configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, QueueStorage>, QueueError> {
        self.storage.write().map_err(|_| QueueError::Service {
            status: 500,
            code: "InternalError".to_string(),
            message: "in-memory queue storage lock poisoned".to_string(),
        })
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn create_queue(
        &self,
        queue: &QueueName,
        metadata: &Metadata,
    ) -> Result<QueueCreation, QueueError> {
        let mut storage = self.write()?;

        if storage.queues.contains_key(queue) {
            return Ok(QueueCreation::AlreadyExisted);
        }

        storage
            .queues
            .insert(queue.clone(), InMemoryQueue::new(metadata.clone()));
        Ok(QueueCreation::Created)
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        let mut storage = self.write()?;

        storage
            .queues
            .remove(queue)
            .map(|_| ())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })
    }

    async fn get_queue_properties(
        &self,
        queue: &QueueName,
    ) -> Result<QueueProperties, QueueError> {
        let mut storage = self.write()?;
        let queue = storage.queue_mut(queue)?;
        queue.purge_expired(&Timestamp::now());

        Ok(QueueProperties {
            approximate_message_count: queue.messages.len() as u64,
            metadata: queue.metadata.clone(),
        })
    }

    async fn put_message(
        &self,
        queue: &QueueName,
        body: &str,
        options: &EnqueueOptions,
    ) -> Result<EnqueuedMessage, QueueError> {
        let mut storage = self.write()?;
        let default_ttl = storage.config.default_message_ttl();
        let queue = storage.queue_mut(queue)?;

        let now = Timestamp::now();
        let never = Timestamp::never_expires();
        let expiration_time = match options.time_to_live.unwrap_or(default_ttl) {
            ttl if ttl.num_seconds() < 0 => never,
            ttl => now
                .checked_plus(ttl)
                .map_or(never.clone(), |expiry| expiry.min(never)),
        };
        let time_next_visible = offset(
            &now,
            "visibility_delay",
            options.visibility_delay.unwrap_or_else(Duration::zero),
        )?;

        let stored = StoredMessage {
            message_id: MessageId::new(),
            body: body.to_string(),
            insertion_time: now.clone(),
            expiration_time,
            time_next_visible,
            dequeue_count: 0,
            pop_receipt: PopReceipt::generate(),
        };

        let enqueued = EnqueuedMessage {
            message_id: stored.message_id.clone(),
            pop_receipt: stored.pop_receipt.clone(),
            insertion_time: stored.insertion_time.clone(),
            expiration_time: stored.expiration_time.clone(),
            time_next_visible: stored.time_next_visible.clone(),
        };

        queue.messages.push_back(stored);
        Ok(enqueued)
    }

    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError> {
        let mut storage = self.write()?;
        let queue = storage.queue_mut(queue)?;

        let now = Timestamp::now();
        queue.purge_expired(&now);

        Ok(queue
            .visible(&now)
            .take(count as usize)
            .map(|m| m.to_peeked())
            .collect())
    }

    async fn get_messages(
        &self,
        queue: &QueueName,
        count: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut storage = self.write()?;
        let lease = visibility_timeout.unwrap_or_else(|| storage.config.default_visibility_timeout());
        let queue = storage.queue_mut(queue)?;

        let now = Timestamp::now();
        queue.purge_expired(&now);

        let next_visible = offset(&now, "visibility_timeout", lease)?;
        let received = queue
            .visible(&now)
            .take(count as usize)
            .map(|m| {
                m.dequeue_count += 1;
                m.time_next_visible = next_visible.clone();
                m.pop_receipt = PopReceipt::generate();
                m.to_received()
            })
            .collect();

        Ok(received)
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let mut storage = self.write()?;
        let queue = storage.queue_mut(queue)?;

        let position = queue
            .messages
            .iter()
            .position(|m| &m.message_id == message_id && &m.pop_receipt == pop_receipt)
            .ok_or_else(|| QueueError::MessageNotFound {
                message_id: message_id.to_string(),
            })?;

        queue.messages.remove(position);
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

/// `now + duration`, rejecting durations that overflow the calendar
fn offset(now: &Timestamp, field: &str, duration: Duration) -> Result<Timestamp, QueueError> {
    now.checked_plus(duration).ok_or_else(|| {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            message: format!("{} seconds is out of range", duration.num_seconds()),
        }
        .into()
    })
}
