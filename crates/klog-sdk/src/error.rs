//! Coded errors for the klog API.
//!
//! Error codes travel verbatim on the wire (`{"ErrorCode":...}` response
//! bodies) and are compared by string; the constants below cover both the
//! server-issued codes and the codes this client raises locally. The
//! classification predicates on [`Error`] drive the retry and drop policies
//! of the request pipeline and the async worker.

use std::sync::Arc;

pub const INTERNAL_SERVER_ERROR: &str = "InternalServerError";
pub const SIGNATURE_NOT_MATCH: &str = "SignatureNotMatch";
pub const POST_BODY_TOO_LARGE: &str = "PostBodyTooLarge";
pub const POST_BODY_INVALID: &str = "PostBodyInvalid"; // deprecated server code
pub const PROJECT_OR_LOG_POOL_NOT_EXIST: &str = "ProjectOrLogPoolNotExist";
pub const USER_NOT_EXIST: &str = "UserNotExist";
pub const MAX_BULK_SIZE_EXCEEDED: &str = "MaxBulkSizeExceeded";
pub const MAX_KEY_COUNT_EXCEEDED: &str = "MaxKeyCountExceeded";
pub const MAX_KEY_SIZE_EXCEEDED: &str = "MaxKeySizeExceeded";
pub const MAX_VALUE_SIZE_EXCEEDED: &str = "MaxValueSizeExceeded";
pub const MAX_LOG_SIZE_EXCEEDED: &str = "MaxLogSizeExceeded";
pub const INVALID_UTF8_IN_KEY: &str = "InvalidUtf8InKey";
pub const INVALID_UTF8_IN_VALUE: &str = "InvalidUtf8InValue";

pub const REQUEST_ERROR: &str = "RequestError";
pub const MISSING_ENDPOINT: &str = "MissingEndpoint";
pub const COMPRESS_LZ4: &str = "CompressLz4";
pub const CONTENT_MD5: &str = "ContentMD5";
pub const UNKNOWN_ERROR: &str = "UnknownError";

/// Message the serialization layer produces when a string field carries
/// bytes that are not valid UTF-8. Matched by message, not code, because it
/// does not arrive as a coded API error.
pub const INVALID_UTF8_WIRE_MESSAGE: &str = "string field contains invalid UTF-8";

/// Response codes which are retryable without any further action.
const RETRYABLE_CODES: &[&str] = &[
    "RequestError",
    "ProvisionedThroughputExceededException",
    "Throttling",
];

/// Codes which signify the cached credentials must be invalidated and
/// re-fetched before the request can be re-signed.
const CREDS_EXPIRED_CODES: &[&str] = &["ExpiredToken", "ExpiredTokenException", "RequestExpired"];

/// Codes meaning the batch contains records the server will never accept;
/// the worker re-validates locally and sheds the offenders.
const REVALIDATE_CODES: &[&str] = &[
    MAX_KEY_COUNT_EXCEEDED,
    MAX_KEY_SIZE_EXCEEDED,
    MAX_VALUE_SIZE_EXCEEDED,
    POST_BODY_INVALID,
];

/// A coded klog error: the wire error code, a human-readable message, and
/// an optional underlying cause.
///
/// `Clone` is deliberate: one flush outcome fans out to a callback per
/// buffered record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    code: String,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error {
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// Retryable without further action: transient transport and throttle
    /// codes, plus the expired-credentials class (those retry after a
    /// credential refresh).
    pub fn is_retryable_code(&self) -> bool {
        RETRYABLE_CODES.contains(&self.code.as_str()) || self.is_expired_creds()
    }

    pub fn is_expired_creds(&self) -> bool {
        CREDS_EXPIRED_CODES.contains(&self.code.as_str())
    }

    /// The batch holds records that can never be transmitted as-is; the
    /// caller must re-validate each record and drop the offenders.
    pub fn requires_revalidation(&self) -> bool {
        REVALIDATE_CODES.contains(&self.code.as_str()) || self.is_invalid_utf8_wire()
    }

    /// The serialization-layer UTF-8 failure. After shedding bad records
    /// this variant retries immediately, without a backoff sleep.
    pub fn is_invalid_utf8_wire(&self) -> bool {
        self.message == INVALID_UTF8_WIRE_MESSAGE
    }

    /// The destination (account or pool) does not exist on the server.
    pub fn is_pool_missing(&self) -> bool {
        self.is(USER_NOT_EXIST) || self.is(PROJECT_OR_LOG_POOL_NOT_EXIST)
    }
}
