//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Queue metadata: user-defined key-value pairs attached at creation
///
/// Keys are case-insensitive. The storage service stores them lowercased, so
/// `Team` set at creation is reported back as `team`. The in-memory provider
/// keeps keys as given.
pub type Metadata = BTreeMap<String, String>;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Name of a storage queue
///
/// Only emptiness is checked locally. Naming rules (length, casing, allowed
/// characters) are enforced by the storage service and surface as errors from
/// the first remote call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "queue_name".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Service-assigned message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque lease token returned by a read, required to delete that read
///
/// A pop receipt is only valid until the message's visibility timeout expires
/// or the message is read again. Freshness is checked by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Generate a fresh random receipt (used by the in-memory provider)
    pub(crate) fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Get pop receipt as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PopReceipt {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "pop_receipt".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// 9999-12-31T23:59:59Z as seconds since the Unix epoch
const NEVER_EXPIRES_SECONDS: i64 = 253_402_300_799;

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse the RFC 1123 form used by the storage REST API
    /// (`Mon, 22 Jan 2024 10:15:00 GMT`)
    pub fn from_rfc1123(value: &str) -> Result<Self, chrono::ParseError> {
        let dt = DateTime::parse_from_rfc2822(value)?;
        Ok(Self(dt.with_timezone(&Utc)))
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp offset from this one, or `None` when out of range
    pub fn checked_plus(&self, duration: Duration) -> Option<Self> {
        self.0.checked_add_signed(duration).map(Self)
    }

    /// Expiration time the service reports for messages that never expire
    /// (`Fri, 31 Dec 9999 23:59:59 GMT`)
    pub fn never_expires() -> Self {
        Self(
            DateTime::from_timestamp(NEVER_EXPIRES_SECONDS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message observed by peeking: still visible, cannot be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeekedMessage {
    pub message_id: MessageId,
    pub body: String,
    pub insertion_time: Timestamp,
    pub expiration_time: Timestamp,
    pub dequeue_count: u32,
}

/// A message read under a lease; carries the pop receipt needed to delete it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub pop_receipt: PopReceipt,
    pub body: String,
    pub insertion_time: Timestamp,
    pub expiration_time: Timestamp,
    /// When the lease ends and the message becomes visible again
    pub time_next_visible: Timestamp,
    pub dequeue_count: u32,
}

/// Acknowledgement of an accepted enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueuedMessage {
    pub message_id: MessageId,
    pub pop_receipt: PopReceipt,
    pub insertion_time: Timestamp,
    pub expiration_time: Timestamp,
    pub time_next_visible: Timestamp,
}

/// Queue attributes reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueueProperties {
    /// Eventually consistent estimate of visible plus leased messages.
    /// Advisory only; never an exact count.
    pub approximate_message_count: u64,
    pub metadata: Metadata,
}

/// Result of a create-if-absent call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueCreation {
    Created,
    AlreadyExisted,
}

impl QueueCreation {
    /// Whether this call created the queue
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Result of reading and deleting the next message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DequeueOutcome {
    /// A message was leased and then deleted
    Deleted(ReceivedMessage),
    /// No visible message was available
    Empty,
}

impl DequeueOutcome {
    /// Whether the queue had nothing to dequeue
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Consume the outcome, yielding the deleted message if there was one
    pub fn into_message(self) -> Option<ReceivedMessage> {
        match self {
            Self::Deleted(message) => Some(message),
            Self::Empty => None,
        }
    }
}

// ============================================================================
// Send and Receive Options
// ============================================================================

/// Options for enqueuing a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Delay before the new message becomes visible
    pub visibility_delay: Option<Duration>,
    /// How long the message lives before the service discards it
    ///
    /// Any negative value means the message never expires.
    pub time_to_live: Option<Duration>,
}

impl EnqueueOptions {
    /// Create new enqueue options with service defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide the message for a period after it is enqueued
    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = Some(delay);
        self
    }

    /// Set time-to-live for message expiration
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Keep the message until it is deleted (sent as `messagettl=-1`)
    pub fn never_expire(mut self) -> Self {
        self.time_to_live = Some(Duration::seconds(-1));
        self
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
