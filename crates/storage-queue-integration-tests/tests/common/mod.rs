//! Common test utilities for storage-queue integration tests
//!
//! This module provides:
//! - A client wired to a wiremock server standing in for the queue service
//! - Builders for the XML bodies the service returns
//! - Mounts for the responses most tests need

use std::sync::Arc;
use storage_queue::{
    AzureStorageQueueProvider, MessageEncoding, QueueName, StorageAccountConfig,
    StorageQueueClient,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCOUNT: &str = "testaccount";
pub const ACCOUNT_KEY: &str = "dGVzdC1hY2NvdW50LWtleS0xMjM0NTY3ODkwYWJjZGVm";
pub const QUEUE: &str = "orders";

/// Request path of the test queue on the path-style endpoint
#[allow(dead_code)]
pub fn queue_path() -> String {
    format!("/{}/{}", ACCOUNT, QUEUE)
}

/// Request path of the test queue's messages
#[allow(dead_code)]
pub fn messages_path() -> String {
    format!("{}/messages", queue_path())
}

// ============================================================================
// Client Construction
// ============================================================================

/// Create a client whose requests go to the mock server
#[allow(dead_code)]
pub fn client_for(server: &MockServer) -> StorageQueueClient {
    client_with_encoding(server, MessageEncoding::Plain)
}

#[allow(dead_code)]
pub fn client_with_encoding(server: &MockServer, encoding: MessageEncoding) -> StorageQueueClient {
    let account = StorageAccountConfig::new(ACCOUNT, ACCOUNT_KEY)
        .with_protocol("http")
        .with_queue_endpoint(format!("{}/{}", server.uri(), ACCOUNT))
        .with_message_encoding(encoding)
        .with_request_timeout_seconds(5);

    let provider = AzureStorageQueueProvider::new(account).unwrap();
    StorageQueueClient::new(
        Arc::new(provider),
        QueueName::new(QUEUE.to_string()).unwrap(),
    )
}

// ============================================================================
// Response Bodies
// ============================================================================

pub const INSERTION_TIME: &str = "Mon, 22 Jan 2024 10:15:00 GMT";
pub const EXPIRATION_TIME: &str = "Mon, 29 Jan 2024 10:15:00 GMT";
pub const NEXT_VISIBLE_TIME: &str = "Mon, 22 Jan 2024 10:15:30 GMT";

/// `PutMessage` response for one message
#[allow(dead_code)]
pub fn put_message_xml(message_id: &str, pop_receipt: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><QueueMessagesList><QueueMessage>\
         <MessageId>{}</MessageId><InsertionTime>{}</InsertionTime>\
         <ExpirationTime>{}</ExpirationTime><PopReceipt>{}</PopReceipt>\
         <TimeNextVisible>{}</TimeNextVisible></QueueMessage></QueueMessagesList>",
        message_id, INSERTION_TIME, EXPIRATION_TIME, pop_receipt, NEXT_VISIBLE_TIME
    )
}

/// `GetMessages` response; each entry is (id, receipt, text)
#[allow(dead_code)]
pub fn get_messages_xml(messages: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><QueueMessagesList>");
    for (id, receipt, text) in messages {
        xml.push_str(&format!(
            "<QueueMessage><MessageId>{}</MessageId><InsertionTime>{}</InsertionTime>\
             <ExpirationTime>{}</ExpirationTime><PopReceipt>{}</PopReceipt>\
             <TimeNextVisible>{}</TimeNextVisible><DequeueCount>1</DequeueCount>\
             <MessageText>{}</MessageText></QueueMessage>",
            id, INSERTION_TIME, EXPIRATION_TIME, receipt, NEXT_VISIBLE_TIME, text
        ));
    }
    xml.push_str("</QueueMessagesList>");
    xml
}

/// `PeekMessages` response; each entry is (id, text)
#[allow(dead_code)]
pub fn peek_messages_xml(messages: &[(&str, &str)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><QueueMessagesList>");
    for (id, text) in messages {
        xml.push_str(&format!(
            "<QueueMessage><MessageId>{}</MessageId><InsertionTime>{}</InsertionTime>\
             <ExpirationTime>{}</ExpirationTime><DequeueCount>0</DequeueCount>\
             <MessageText>{}</MessageText></QueueMessage>",
            id, INSERTION_TIME, EXPIRATION_TIME, text
        ));
    }
    xml.push_str("</QueueMessagesList>");
    xml
}

/// Service error body
#[allow(dead_code)]
pub fn error_xml(code: &str, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>{}</Code>\
         <Message>{}\nRequestId:00000000-0000-0000-0000-000000000000\nTime:2024-01-22T10:15:00.0000000Z</Message></Error>",
        code, message
    )
}

/// Error response with the code in both header and body, as the service sends it
#[allow(dead_code)]
pub fn error_response(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("x-ms-error-code", code)
        .set_body_string(error_xml(code, message))
}

// ============================================================================
// Common Mounts
// ============================================================================

/// Answer queue creation with "already exists"
#[allow(dead_code)]
pub async fn mount_existing_queue(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(queue_path()))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}
