//! Queue operations against a mocked storage service
//!
//! These tests drive [`StorageQueueClient`] through the REST provider and
//! check both the requests it sends and how it interprets the responses.

mod common;

use chrono::Duration;
use common::*;
use storage_queue::{
    DequeueOutcome, EnqueueOptions, Metadata, MessageEncoding, MessageId, PopReceipt,
    QueueCreation, QueueError,
};
use wiremock::matchers::{
    body_string_contains, header, header_exists, header_regex, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Queue Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    /// Verify creation sends signed metadata headers and reports a new queue
    #[tokio::test]
    async fn test_create_queue_with_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(queue_path()))
            .and(header("x-ms-meta-team", "payments"))
            .and(header("x-ms-version", "2019-12-12"))
            .and(header_exists("x-ms-date"))
            .and(header_regex(
                "authorization",
                r"^SharedKey testaccount:[A-Za-z0-9+/]+=*$",
            ))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut metadata = Metadata::new();
        metadata.insert("team".to_string(), "payments".to_string());

        let creation = client.ensure_queue_exists(&metadata).await.unwrap();
        assert_eq!(creation, QueueCreation::Created);
    }

    /// Verify metadata keys come back lowercased from the service
    #[tokio::test]
    async fn test_metadata_keys_are_lowercased() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(queue_path()))
            .and(header_exists("x-ms-meta-team"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(queue_path()))
            .and(query_param("comp", "metadata"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-approximate-messages-count", "0")
                    .insert_header("x-ms-meta-team", "payments"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut metadata = Metadata::new();
        metadata.insert("Team".to_string(), "payments".to_string());
        client.ensure_queue_exists(&metadata).await.unwrap();

        let properties = client.properties().await.unwrap();
        assert_eq!(properties.metadata.get("team").map(String::as_str), Some("payments"));
        assert!(!properties.metadata.contains_key("Team"));
    }

    /// Verify an existing queue is not an error
    #[tokio::test]
    async fn test_existing_queue_is_success() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;

        let client = client_for(&server);
        let creation = client.ensure_queue_exists(&Metadata::new()).await.unwrap();
        assert_eq!(creation, QueueCreation::AlreadyExisted);
    }

    /// Verify a metadata conflict on an existing queue is also success
    #[tokio::test]
    async fn test_conflicting_create_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(queue_path()))
            .respond_with(error_response(
                409,
                "QueueAlreadyExists",
                "The specified queue already exists.",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let creation = client.ensure_queue_exists(&Metadata::new()).await.unwrap();
        assert_eq!(creation, QueueCreation::AlreadyExisted);
    }

    /// Verify deleting the queue never creates it first
    #[tokio::test]
    async fn test_delete_queue_skips_creation() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(queue_path()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).delete_queue().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_missing_queue() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(queue_path()))
            .respond_with(error_response(
                404,
                "QueueNotFound",
                "The specified queue does not exist.",
            ))
            .mount(&server)
            .await;

        let result = client_for(&server).delete_queue().await;
        assert!(matches!(
            result,
            Err(QueueError::QueueNotFound { ref queue_name }) if queue_name == QUEUE
        ));
    }
}

// ============================================================================
// Enqueue
// ============================================================================

mod enqueue_tests {
    use super::*;

    /// Verify the message is posted as XML and the receipt is parsed
    #[tokio::test]
    async fn test_enqueue_posts_message() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("POST"))
            .and(path(messages_path()))
            .and(header("content-type", "application/xml"))
            .and(body_string_contains(
                "<QueueMessage><MessageText>order &lt;42&gt;</MessageText></QueueMessage>",
            ))
            .respond_with(
                ResponseTemplate::new(201).set_body_string(put_message_xml("msg-1", "AgAAAA==")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let enqueued = client_for(&server).enqueue("order <42>").await.unwrap();

        assert_eq!(enqueued.message_id.as_str(), "msg-1");
        assert_eq!(enqueued.pop_receipt.as_str(), "AgAAAA==");
        assert_eq!(enqueued.insertion_time.to_string(), "2024-01-22 10:15:00 UTC");
    }

    /// Verify visibility delay and time-to-live travel as query parameters
    #[tokio::test]
    async fn test_enqueue_with_options() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("POST"))
            .and(path(messages_path()))
            .and(query_param("visibilitytimeout", "30"))
            .and(query_param("messagettl", "3600"))
            .respond_with(
                ResponseTemplate::new(201).set_body_string(put_message_xml("msg-2", "AgAAAB==")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let options = EnqueueOptions::new()
            .with_visibility_delay(Duration::seconds(30))
            .with_time_to_live(Duration::seconds(3600));

        let enqueued = client_for(&server)
            .enqueue_with("delayed", options)
            .await
            .unwrap();
        assert_eq!(enqueued.message_id.as_str(), "msg-2");
    }

    /// Verify never-expiring messages are sent with the service's -1 TTL
    #[tokio::test]
    async fn test_enqueue_never_expiring() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("POST"))
            .and(path(messages_path()))
            .and(query_param("messagettl", "-1"))
            .respond_with(
                ResponseTemplate::new(201).set_body_string(put_message_xml("msg-4", "AgAAAE==")),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .enqueue_with("forever", EnqueueOptions::new().never_expire())
            .await
            .unwrap();
        client
            .enqueue_with(
                "also forever",
                EnqueueOptions::new().with_time_to_live(Duration::seconds(-30)),
            )
            .await
            .unwrap();
    }

    /// Verify base64 encoding applies to both sent and received bodies
    #[tokio::test]
    async fn test_base64_round_trip() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("POST"))
            .and(path(messages_path()))
            .and(body_string_contains("<MessageText>aGVsbG8=</MessageText>"))
            .respond_with(
                ResponseTemplate::new(201).set_body_string(put_message_xml("msg-3", "AgAAAC==")),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string(get_messages_xml(&[(
                "msg-3", "AgAAAD==", "aGVsbG8=",
            )])))
            .mount(&server)
            .await;

        let client = client_with_encoding(&server, MessageEncoding::Base64);
        client.enqueue("hello").await.unwrap();

        let received = client.list_one().await.unwrap().unwrap();
        assert_eq!(received.body, "hello");
    }
}

// ============================================================================
// Reading Messages
// ============================================================================

mod read_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_with_visibility_timeout() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .and(query_param("numofmessages", "2"))
            .and(query_param("visibilitytimeout", "60"))
            .respond_with(ResponseTemplate::new(200).set_body_string(get_messages_xml(&[
                ("msg-1", "AgAAAA==", "first"),
                ("msg-2", "AgAAAB==", "second"),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let messages = client_for(&server)
            .list_with_visibility(2, Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "first");
        assert_eq!(messages[1].pop_receipt.as_str(), "AgAAAB==");
        assert_eq!(messages[1].dequeue_count, 1);
        assert_eq!(
            messages[1].time_next_visible.to_string(),
            "2024-01-22 10:15:30 UTC"
        );
    }

    /// Verify an empty queue lists as an empty vector, not an error
    #[tokio::test]
    async fn test_list_empty_queue() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string(get_messages_xml(&[])))
            .mount(&server)
            .await;

        let messages = client_for(&server).list(5).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_peek_sends_peekonly() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .and(query_param("peekonly", "true"))
            .and(query_param("numofmessages", "3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(peek_messages_xml(&[("msg-1", "  padded  ")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let peeked = client_for(&server).peek(3).await.unwrap();

        assert_eq!(peeked.len(), 1);
        assert_eq!(peeked[0].message_id.as_str(), "msg-1");
        assert_eq!(peeked[0].body, "  padded  ");
        assert_eq!(peeked[0].dequeue_count, 0);
    }

    /// Verify both length accessors read the same header
    #[tokio::test]
    async fn test_length_accessors_agree() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(queue_path()))
            .and(query_param("comp", "metadata"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-approximate-messages-count", "7")
                    .insert_header("x-ms-meta-team", "payments"),
            )
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.approximate_length().await.unwrap(), 7);
        assert_eq!(client.queue_length().await.unwrap(), 7);

        let properties = client.properties().await.unwrap();
        assert_eq!(properties.metadata.get("team").map(String::as_str), Some("payments"));
    }
}

// ============================================================================
// Dequeue
// ============================================================================

mod dequeue_tests {
    use super::*;

    #[tokio::test]
    async fn test_dequeue_with_receipt() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/msg-1", messages_path())))
            .and(query_param("popreceipt", "AgAAAA+/=="))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let id: MessageId = "msg-1".parse().unwrap();
        let receipt: PopReceipt = "AgAAAA+/==".parse().unwrap();

        client_for(&server).dequeue(&id, &receipt).await.unwrap();
    }

    /// Verify a stale pop receipt surfaces as a missing message
    #[tokio::test]
    async fn test_dequeue_with_stale_receipt() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/msg-1", messages_path())))
            .respond_with(error_response(
                404,
                "MessageNotFound",
                "The specified message does not exist.",
            ))
            .mount(&server)
            .await;

        let id: MessageId = "msg-1".parse().unwrap();
        let receipt: PopReceipt = "stale".parse().unwrap();

        let result = client_for(&server).dequeue(&id, &receipt).await;
        assert!(matches!(
            result,
            Err(QueueError::MessageNotFound { ref message_id }) if message_id == "msg-1"
        ));
    }

    /// Verify the next message is leased and then deleted with its receipt
    #[tokio::test]
    async fn test_dequeue_next_deletes_leased_message() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .and(query_param("numofmessages", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(get_messages_xml(&[(
                "msg-9", "AgAAAZ==", "next job",
            )])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/msg-9", messages_path())))
            .and(query_param("popreceipt", "AgAAAZ=="))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server).dequeue_next().await.unwrap();

        let message = outcome.into_message().unwrap();
        assert_eq!(message.message_id.as_str(), "msg-9");
        assert_eq!(message.body, "next job");
    }

    /// Verify an empty queue yields Empty without attempting a delete
    #[tokio::test]
    async fn test_dequeue_next_on_empty_queue() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .respond_with(ResponseTemplate::new(200).set_body_string(get_messages_xml(&[])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = client_for(&server).dequeue_next().await.unwrap();
        assert_eq!(outcome, DequeueOutcome::Empty);
    }
}

// ============================================================================
// Service Errors
// ============================================================================

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(error_response(
                403,
                "AuthenticationFailed",
                "Server failed to authenticate the request.",
            ))
            .mount(&server)
            .await;

        let result = client_for(&server).enqueue("hello").await;
        assert!(matches!(
            result,
            Err(QueueError::AuthenticationFailed { .. })
        ));
    }

    /// Verify service code and message survive for callers to inspect
    #[tokio::test]
    async fn test_server_busy_is_transient() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(messages_path()))
            .respond_with(error_response(503, "ServerBusy", "The server is busy."))
            .mount(&server)
            .await;

        let error = client_for(&server).list(1).await.unwrap_err();

        assert_eq!(error.code(), "ServerBusy");
        assert_eq!(error.message(), "The server is busy.");
        assert_eq!(error.status(), Some(503));
        assert!(error.is_transient());
    }

    /// Verify a failed length query is an error, never a zero count
    #[tokio::test]
    async fn test_length_failure_is_not_zero() {
        let server = MockServer::start().await;
        mount_existing_queue(&server).await;
        Mock::given(method("GET"))
            .and(path(queue_path()))
            .respond_with(error_response(
                500,
                "InternalError",
                "The server encountered an internal error.",
            ))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = client.approximate_length().await.unwrap_err();
        let second = client.queue_length().await.unwrap_err();

        assert_eq!(first.code(), "InternalError");
        assert_eq!(first.code(), second.code());
    }
}
