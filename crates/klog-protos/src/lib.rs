//! Wire schema message types for the klog ingestion API.
//!
//! The message definitions below are checked in, in the shape prost emits,
//! so the workspace builds without a protoc toolchain. Higher layers only
//! depend on `Message::encode_to_vec` and `Message::encoded_len`; the wire
//! layout itself is owned by this crate.
//!
//! `Content` keys and values are `bytes` fields. On the wire that is
//! length-delimited and interchangeable with proto `string`; in the API it
//! lets the client enforce UTF-8 validity itself instead of having the type
//! system silently guarantee it.

/// A single key/value pair inside a log record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Content {
    #[prost(bytes = "vec", tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub value: ::prost::alloc::vec::Vec<u8>,
}

/// A single structured log record.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Log {
    /// Seconds since the Unix epoch.
    #[prost(int64, tag = "1")]
    pub time: i64,
    /// Ordered key/value content pairs.
    #[prost(message, repeated, tag = "2")]
    pub contents: ::prost::alloc::vec::Vec<Content>,
    #[prost(string, tag = "3")]
    pub source: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub filename: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub reserved: ::prost::alloc::string::String,
}

/// An ordered batch of log records with optional metadata, the unit of one
/// PutLogs request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogGroup {
    #[prost(message, repeated, tag = "1")]
    pub logs: ::prost::alloc::vec::Vec<Log>,
    #[prost(string, tag = "2")]
    pub reserved: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub filename: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub source: ::prost::alloc::string::String,
}

impl Content {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Content {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Log {
    pub fn new(time: i64, contents: Vec<Content>) -> Self {
        Log {
            time,
            contents,
            ..Log::default()
        }
    }
}
