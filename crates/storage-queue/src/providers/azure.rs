//! Azure Storage Queue provider implementation using the HTTP REST API.
//!
//! Requests are signed with the storage account's Shared Key and sent with
//! `reqwest`; XML responses are parsed with `quick-xml`. Calling the REST API
//! directly keeps the provider small and lets tests drive it against a mocked
//! HTTP server.
//!
//! ## Endpoints
//!
//! The queue service URL is derived from the account name and endpoint
//! suffix (`https://{account}.queue.core.windows.net`) unless an explicit
//! queue endpoint is configured. Path-style endpoints, such as the local
//! emulator's `http://127.0.0.1:10001/devstoreaccount1`, are supported.
//!
//! ## Message Encoding
//!
//! The service stores message text as-is. With [`MessageEncoding::Base64`]
//! bodies are base64-encoded before sending and decoded after reading, which
//! matches what most other storage SDKs write.
//!
//! ## Example
//!
//! ```no_run
//! use storage_queue::{QueueClientFactory, QueueConfig, ProviderConfig, StorageAccountConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QueueConfig {
//!     provider: ProviderConfig::AzureStorage(StorageAccountConfig::development_storage()),
//!     queue_name: "orders".to_string(),
//! };
//!
//! let client = QueueClientFactory::create_client(config)?;
//! client.enqueue("hello").await?;
//! # Ok(())
//! # }
//! ```

use crate::client::QueueProvider;
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{
    EnqueueOptions, EnqueuedMessage, Metadata, MessageId, PeekedMessage, PopReceipt,
    QueueCreation, QueueName, QueueProperties, ReceivedMessage, Timestamp,
};
use crate::provider::{MessageEncoding, ProviderType, StorageAccountConfig};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Method, StatusCode};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// REST API version sent with every request
pub const API_VERSION: &str = "2019-12-12";

const APPROXIMATE_COUNT_HEADER: &str = "x-ms-approximate-messages-count";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const METADATA_PREFIX: &str = "x-ms-meta-";
const XML_CONTENT_TYPE: &str = "application/xml";

// ============================================================================
// Error Types
// ============================================================================

/// Azure Storage specific errors
#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Storage service error ({status}): {code} - {message}")]
    ServiceError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),

    #[error(transparent)]
    SerializationError(#[from] SerializationError),
}

impl AzureError {
    /// Map Azure error to QueueError
    pub fn to_queue_error(self) -> QueueError {
        match self {
            Self::Authentication(message) => QueueError::AuthenticationFailed { message },
            Self::NetworkError(message) => QueueError::ConnectionFailed { message },
            Self::Timeout(seconds) => QueueError::Timeout { seconds },
            Self::QueueNotFound(queue_name) => QueueError::QueueNotFound { queue_name },
            Self::MessageNotFound(message_id) => QueueError::MessageNotFound { message_id },
            Self::ServiceError {
                status,
                code,
                message,
            } => QueueError::Service {
                status,
                code,
                message,
            },
            Self::ConfigurationError(message) => {
                QueueError::Configuration(ConfigurationError::Invalid { message })
            }
            Self::SerializationError(e) => QueueError::Serialization(e),
        }
    }
}

impl From<AzureError> for QueueError {
    fn from(error: AzureError) -> Self {
        error.to_queue_error()
    }
}

// ============================================================================
// Shared Key Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// Shared Key signer for storage service requests
///
/// The string to sign is the verb, eleven standard header lines (of which
/// only `Content-Length` and `Content-Type` are used here; the date travels
/// in `x-ms-date`), the canonicalized `x-ms-*` headers and the canonicalized
/// resource.
///
/// ## References
///
/// - [Authorize with Shared Key](https://learn.microsoft.com/rest/api/storageservices/authorize-with-shared-key)
#[derive(Clone)]
struct SharedKeySigner {
    account_name: String,
    key: Vec<u8>,
}

impl SharedKeySigner {
    fn new(account_name: &str, account_key: &str) -> Result<Self, AzureError> {
        let key = STANDARD.decode(account_key.trim()).map_err(|_| {
            AzureError::ConfigurationError("account key is not valid base64".to_string())
        })?;

        Ok(Self {
            account_name: account_name.to_string(),
            key,
        })
    }

    /// Build the canonical string covered by the signature
    ///
    /// `ms_headers` must hold lowercase `x-ms-*` names. `query` holds decoded
    /// parameter values.
    fn string_to_sign(
        &self,
        method: &str,
        content_length: usize,
        content_type: &str,
        ms_headers: &BTreeMap<String, String>,
        url_path: &str,
        query: &[(String, String)],
    ) -> String {
        // Zero length is signed as an empty line
        let length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        let standard_headers = [
            method,
            "", // Content-Encoding
            "", // Content-Language
            &length,
            "", // Content-MD5
            content_type,
            "", // Date
            "", // If-Modified-Since
            "", // If-Match
            "", // If-None-Match
            "", // If-Unmodified-Since
            "", // Range
        ];

        let mut value = String::new();
        for line in standard_headers {
            value.push_str(line);
            value.push('\n');
        }

        for (name, header_value) in ms_headers {
            value.push_str(name);
            value.push(':');
            value.push_str(header_value.trim());
            value.push('\n');
        }

        value.push('/');
        value.push_str(&self.account_name);
        value.push_str(url_path);

        let mut params: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for (name, param_value) in query {
            params
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(param_value);
        }
        for (name, mut values) in params {
            values.sort_unstable();
            value.push('\n');
            value.push_str(&name);
            value.push(':');
            value.push_str(&values.join(","));
        }

        value
    }

    /// Base64 HMAC-SHA256 of the string to sign
    fn sign(&self, string_to_sign: &str) -> Result<String, AzureError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| {
            AzureError::ConfigurationError(format!("account key rejected by HMAC: {}", e))
        })?;
        mac.update(string_to_sign.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Value of the `Authorization` header
    fn authorization(&self, string_to_sign: &str) -> Result<String, AzureError> {
        Ok(format!(
            "SharedKey {}:{}",
            self.account_name,
            self.sign(string_to_sign)?
        ))
    }
}

/// RFC 1123 date as required by `x-ms-date`
fn format_request_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// ============================================================================
// Request / Response Plumbing
// ============================================================================

/// A single REST call against one queue
struct ServiceRequest<'a> {
    method: Method,
    queue: &'a QueueName,
    /// Path below the queue, e.g. `messages` or `messages/{id}`
    resource: Vec<&'a str>,
    query: Vec<(String, String)>,
    metadata: Option<&'a Metadata>,
    body: Option<String>,
    message_id: Option<&'a MessageId>,
}

impl<'a> ServiceRequest<'a> {
    fn new(method: Method, queue: &'a QueueName) -> Self {
        Self {
            method,
            queue,
            resource: Vec::new(),
            query: Vec::new(),
            metadata: None,
            body: None,
            message_id: None,
        }
    }

    fn resource(mut self, segment: &'a str) -> Self {
        self.resource.push(segment);
        self
    }

    fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    fn metadata(mut self, metadata: &'a Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    fn message(mut self, message_id: &'a MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

/// Successful response: status, headers and body text
struct ServiceResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

// ============================================================================
// Azure Storage Queue Provider
// ============================================================================

/// Azure Storage Queue provider implementation
///
/// Stateless apart from the HTTP connection pool; safe to share across
/// tasks behind an `Arc`.
pub struct AzureStorageQueueProvider {
    http_client: HttpClient,
    signer: SharedKeySigner,
    endpoint: String,
    encoding: MessageEncoding,
    request_timeout_seconds: u64,
}

impl AzureStorageQueueProvider {
    /// Create new Azure Storage Queue provider
    ///
    /// # Errors
    ///
    /// Returns error if the account configuration is incomplete, the key is
    /// not base64, or the HTTP client cannot be built.
    pub fn new(config: StorageAccountConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let signer = SharedKeySigner::new(&config.account_name, &config.account_key).map_err(
            |e| ConfigurationError::Invalid {
                message: e.to_string(),
            },
        )?;

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            endpoint: config.queue_endpoint(),
            encoding: config.message_encoding,
            request_timeout_seconds: config.request_timeout_seconds,
        })
    }

    /// Queue service base URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sign and send a request, returning the response for 2xx statuses
    async fn send(&self, request: ServiceRequest<'_>) -> Result<ServiceResponse, AzureError> {
        let mut segments = vec![urlencoding::encode(request.queue.as_str()).into_owned()];
        segments.extend(
            request
                .resource
                .iter()
                .map(|s| urlencoding::encode(s).into_owned()),
        );

        let mut url = url::Url::parse(&format!("{}/{}", self.endpoint, segments.join("/")))
            .map_err(|e| AzureError::ConfigurationError(format!("Invalid request URL: {}", e)))?;
        if !request.query.is_empty() {
            let query_string = request
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query_string));
        }

        let mut ms_headers = BTreeMap::new();
        ms_headers.insert("x-ms-date".to_string(), format_request_date(&Utc::now()));
        ms_headers.insert("x-ms-version".to_string(), API_VERSION.to_string());
        if let Some(metadata) = request.metadata {
            for (key, value) in metadata {
                ms_headers.insert(
                    format!("{}{}", METADATA_PREFIX, key.to_ascii_lowercase()),
                    value.trim().to_string(),
                );
            }
        }

        let body = request.body.unwrap_or_default();
        let content_type = if body.is_empty() { "" } else { XML_CONTENT_TYPE };

        let string_to_sign = self.signer.string_to_sign(
            request.method.as_str(),
            body.len(),
            content_type,
            &ms_headers,
            url.path(),
            &request.query,
        );
        let authorization = self.signer.authorization(&string_to_sign)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &ms_headers {
            headers.insert(header_name(name)?, header_value(name, value)?);
        }
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value("authorization", &authorization)?,
        );

        let mut builder = self
            .http_client
            .request(request.method.clone(), url.clone())
            .headers(headers);
        if !body.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, XML_CONTENT_TYPE)
                .body(body);
        }

        debug!(method = %request.method, path = url.path(), "Sending storage request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AzureError::Timeout(self.request_timeout_seconds)
            } else if e.is_connect() {
                AzureError::NetworkError(format!("Connection failed: {}", e))
            } else {
                AzureError::NetworkError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| AzureError::NetworkError(format!("Failed to read response body: {}", e)))?;

        debug!(status = status.as_u16(), path = url.path(), "Storage response");

        if !status.is_success() {
            return Err(parse_error_response(
                status.as_u16(),
                &headers,
                &body,
                request.queue,
                request.message_id,
            ));
        }

        Ok(ServiceResponse {
            status,
            headers,
            body,
        })
    }
}

impl fmt::Debug for AzureStorageQueueProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorageQueueProvider")
            .field("account_name", &self.signer.account_name)
            .field("endpoint", &self.endpoint)
            .field("encoding", &self.encoding)
            .finish()
    }
}

#[async_trait]
impl QueueProvider for AzureStorageQueueProvider {
    async fn create_queue(
        &self,
        queue: &QueueName,
        metadata: &Metadata,
    ) -> Result<QueueCreation, QueueError> {
        let request = ServiceRequest::new(Method::PUT, queue).metadata(metadata);

        match self.send(request).await {
            Ok(response) if response.status == StatusCode::CREATED => Ok(QueueCreation::Created),
            Ok(_) => Ok(QueueCreation::AlreadyExisted),
            // Existing queue with different metadata
            Err(AzureError::ServiceError { code, .. }) if code == "QueueAlreadyExists" => {
                Ok(QueueCreation::AlreadyExisted)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_queue(&self, queue: &QueueName) -> Result<(), QueueError> {
        self.send(ServiceRequest::new(Method::DELETE, queue)).await?;
        Ok(())
    }

    async fn get_queue_properties(
        &self,
        queue: &QueueName,
    ) -> Result<QueueProperties, QueueError> {
        let request = ServiceRequest::new(Method::GET, queue).query("comp", "metadata");
        let response = self.send(request).await?;

        Ok(parse_queue_properties(&response.headers)?)
    }

    async fn put_message(
        &self,
        queue: &QueueName,
        body: &str,
        options: &EnqueueOptions,
    ) -> Result<EnqueuedMessage, QueueError> {
        let mut request = ServiceRequest::new(Method::POST, queue)
            .resource("messages")
            .body(build_put_message_body(body, self.encoding));
        if let Some(delay) = options.visibility_delay {
            request = request.query("visibilitytimeout", delay.num_seconds());
        }
        if let Some(ttl) = options.time_to_live {
            // -1 is the service's only spelling of "never expires"
            request = request.query("messagettl", ttl.num_seconds().max(-1));
        }

        let response = self.send(request).await?;
        let fields = parse_message_list(&response.body)?
            .into_iter()
            .next()
            .ok_or_else(|| SerializationError::MissingElement {
                element: "QueueMessage".to_string(),
            })?;

        Ok(EnqueuedMessage {
            message_id: fields.message_id()?,
            pop_receipt: fields.pop_receipt()?,
            insertion_time: fields.timestamp("InsertionTime")?,
            expiration_time: fields.timestamp("ExpirationTime")?,
            time_next_visible: fields.timestamp("TimeNextVisible")?,
        })
    }

    async fn peek_messages(
        &self,
        queue: &QueueName,
        count: u32,
    ) -> Result<Vec<PeekedMessage>, QueueError> {
        let request = ServiceRequest::new(Method::GET, queue)
            .resource("messages")
            .query("peekonly", "true")
            .query("numofmessages", count);
        let response = self.send(request).await?;

        parse_message_list(&response.body)?
            .into_iter()
            .map(|fields| -> Result<PeekedMessage, QueueError> {
                Ok(PeekedMessage {
                    message_id: fields.message_id()?,
                    body: fields.message_text(self.encoding)?,
                    insertion_time: fields.timestamp("InsertionTime")?,
                    expiration_time: fields.timestamp("ExpirationTime")?,
                    dequeue_count: fields.dequeue_count()?,
                })
            })
            .collect()
    }

    async fn get_messages(
        &self,
        queue: &QueueName,
        count: u32,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut request = ServiceRequest::new(Method::GET, queue)
            .resource("messages")
            .query("numofmessages", count);
        if let Some(timeout) = visibility_timeout {
            request = request.query("visibilitytimeout", timeout.num_seconds());
        }
        let response = self.send(request).await?;

        parse_message_list(&response.body)?
            .into_iter()
            .map(|fields| -> Result<ReceivedMessage, QueueError> {
                Ok(ReceivedMessage {
                    message_id: fields.message_id()?,
                    pop_receipt: fields.pop_receipt()?,
                    body: fields.message_text(self.encoding)?,
                    insertion_time: fields.timestamp("InsertionTime")?,
                    expiration_time: fields.timestamp("ExpirationTime")?,
                    time_next_visible: fields.timestamp("TimeNextVisible")?,
                    dequeue_count: fields.dequeue_count()?,
                })
            })
            .collect()
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        message_id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let request = ServiceRequest::new(Method::DELETE, queue)
            .resource("messages")
            .resource(message_id.as_str())
            .query("popreceipt", pop_receipt.as_str())
            .message(message_id);

        self.send(request).await?;
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureStorage
    }
}

fn header_name(name: &str) -> Result<HeaderName, AzureError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
        AzureError::SerializationError(SerializationError::InvalidHeader {
            header: name.to_string(),
            value: String::new(),
        })
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, AzureError> {
    HeaderValue::from_str(value).map_err(|_| {
        AzureError::SerializationError(SerializationError::InvalidHeader {
            header: name.to_string(),
            value: value.to_string(),
        })
    })
}

// ============================================================================
// XML Bodies
// ============================================================================

/// Build the `PutMessage` request body
fn build_put_message_body(body: &str, encoding: MessageEncoding) -> String {
    let text = match encoding {
        MessageEncoding::Plain => quick_xml::escape::escape(body).into_owned(),
        MessageEncoding::Base64 => STANDARD.encode(body.as_bytes()),
    };

    format!(
        "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
        text
    )
}

/// Child elements of one `<QueueMessage>` in a `<QueueMessagesList>`
#[derive(Debug, Default)]
struct MessageFields {
    values: HashMap<String, String>,
}

impl MessageFields {
    fn required(&self, element: &str) -> Result<&str, SerializationError> {
        self.values
            .get(element)
            .map(String::as_str)
            .ok_or_else(|| SerializationError::MissingElement {
                element: element.to_string(),
            })
    }

    fn message_id(&self) -> Result<MessageId, SerializationError> {
        self.required("MessageId")?
            .parse()
            .map_err(|_| SerializationError::MissingElement {
                element: "MessageId".to_string(),
            })
    }

    fn pop_receipt(&self) -> Result<PopReceipt, SerializationError> {
        self.required("PopReceipt")?
            .parse()
            .map_err(|_| SerializationError::MissingElement {
                element: "PopReceipt".to_string(),
            })
    }

    fn timestamp(&self, element: &str) -> Result<Timestamp, SerializationError> {
        let value = self.required(element)?;
        Timestamp::from_rfc1123(value).map_err(|e| SerializationError::Xml {
            message: format!("{} '{}' is not an RFC 1123 date: {}", element, value, e),
        })
    }

    fn dequeue_count(&self) -> Result<u32, SerializationError> {
        let value = self.required("DequeueCount")?;
        value.parse().map_err(|_| SerializationError::Xml {
            message: format!("DequeueCount '{}' is not a number", value),
        })
    }

    /// Message body; an empty `<MessageText/>` is an empty body
    fn message_text(&self, encoding: MessageEncoding) -> Result<String, SerializationError> {
        let text = self
            .values
            .get("MessageText")
            .map(String::as_str)
            .unwrap_or_default();

        match encoding {
            MessageEncoding::Plain => Ok(text.to_string()),
            MessageEncoding::Base64 => {
                let bytes = STANDARD
                    .decode(text.trim())
                    .map_err(|e| SerializationError::InvalidBase64 {
                        message: e.to_string(),
                    })?;
                String::from_utf8(bytes).map_err(|_| SerializationError::InvalidUtf8)
            }
        }
    }
}

/// Parse a `<QueueMessagesList>` response body
///
/// Whitespace is kept inside elements so message text survives unchanged.
fn parse_message_list(xml: &str) -> Result<Vec<MessageFields>, SerializationError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);

    let mut messages = Vec::new();
    let mut current: Option<MessageFields> = None;
    let mut element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "QueueMessage" {
                    current = Some(MessageFields::default());
                } else if current.is_some() {
                    element = Some(name);
                }
            }
            Ok(Event::Empty(ref e)) => {
                // <MessageText/> carries an empty value
                if let Some(fields) = current.as_mut() {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    fields.values.entry(name).or_default();
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(fields), Some(name)) = (current.as_mut(), element.as_ref()) {
                    let text = e.unescape().map_err(|e| SerializationError::Xml {
                        message: e.to_string(),
                    })?;
                    fields
                        .values
                        .entry(name.clone())
                        .or_default()
                        .push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(fields), Some(name)) = (current.as_mut(), element.as_ref()) {
                    let text = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|_| SerializationError::InvalidUtf8)?;
                    fields
                        .values
                        .entry(name.clone())
                        .or_default()
                        .push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"QueueMessage" {
                    if let Some(fields) = current.take() {
                        messages.push(fields);
                    }
                } else if let (Some(fields), Some(name)) = (current.as_mut(), element.take()) {
                    // <MessageText></MessageText> produces no text event
                    fields.values.entry(name).or_default();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SerializationError::Xml {
                    message: format!(
                        "XML parsing error at position {}: {}",
                        reader.buffer_position(),
                        e
                    ),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Read count and metadata from a `GetQueueMetadata` response
fn parse_queue_properties(headers: &HeaderMap) -> Result<QueueProperties, SerializationError> {
    let approximate_message_count = match headers.get(APPROXIMATE_COUNT_HEADER) {
        Some(value) => {
            let text = value.to_str().unwrap_or_default();
            text.trim()
                .parse()
                .map_err(|_| SerializationError::InvalidHeader {
                    header: APPROXIMATE_COUNT_HEADER.to_string(),
                    value: text.to_string(),
                })?
        }
        None => {
            return Err(SerializationError::MissingElement {
                element: APPROXIMATE_COUNT_HEADER.to_string(),
            })
        }
    };

    let metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(METADATA_PREFIX)?;
            Some((key.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect();

    Ok(QueueProperties {
        approximate_message_count,
        metadata,
    })
}

/// Map a non-success response to an [`AzureError`]
///
/// The error code comes from the `<Error><Code>` body element, falling back
/// to the `x-ms-error-code` header (bodies are absent on HEAD-like replies).
fn parse_error_response(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    queue: &QueueName,
    message_id: Option<&MessageId>,
) -> AzureError {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = false,
                b"Code" => in_code = false,
                b"Message" => in_message = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code
        .or_else(|| {
            headers
                .get(ERROR_CODE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown")
                .replace(' ', "")
        });
    let message = error_message
        .map(|m| m.lines().next().unwrap_or_default().to_string())
        .unwrap_or_else(|| format!("Request failed with status {}", status));

    match code.as_str() {
        "QueueNotFound" => AzureError::QueueNotFound(queue.to_string()),
        "MessageNotFound" | "PopReceiptMismatch" => AzureError::MessageNotFound(
            message_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| message.clone()),
        ),
        "AuthenticationFailed" | "AuthorizationFailure" => {
            AzureError::Authentication(format!("{}: {}", code, message))
        }
        _ if status == 401 || status == 403 => {
            AzureError::Authentication(format!("{}: {}", code, message))
        }
        _ => AzureError::ServiceError {
            status,
            code,
            message,
        },
    }
}
