//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueProvider`
//! trait: the storage service REST API and an in-process double.

pub mod azure;
pub mod memory;

pub use azure::{AzureError, AzureStorageQueueProvider};
pub use memory::InMemoryProvider;
