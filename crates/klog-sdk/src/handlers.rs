//! Request-phase handlers and the named handler lists they run in.
//!
//! Each phase of the request lifecycle owns an ordered list of plain
//! `fn(&mut Request)` handlers; the set installed is decided once per
//! client from its configuration (compression, checksums), and the lists
//! stay insertable so codecs or signature schemes can be added without
//! touching the send loop.

use std::io::Write;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use lz4_flex::frame::FrameEncoder;
use md5::{Digest, Md5};
use reqwest::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{
    Error, COMPRESS_LZ4, MISSING_ENDPOINT, UNKNOWN_ERROR,
};
use crate::request::Request;
use crate::service::{API_VERSION, SDK_USER_AGENT};

pub type Handler = fn(&mut Request);

/// An ordered list of handlers for one lifecycle phase. Handlers run in
/// insertion order and communicate failures through `Request::error`.
#[derive(Clone, Debug, Default)]
pub struct HandlerList {
    list: Vec<Handler>,
}

impl HandlerList {
    pub fn push_back(&mut self, handler: Handler) {
        self.list.push(handler);
    }

    pub fn push_front(&mut self, handler: Handler) {
        self.list.insert(0, handler);
    }

    pub fn run(&self, req: &mut Request) {
        for handler in &self.list {
            handler(req);
        }
    }
}

/// The named phases of the request lifecycle. The HTTP exchange itself and
/// the retry delay are driven by `Request::send`.
#[derive(Clone, Debug, Default)]
pub struct Handlers {
    pub validate: HandlerList,
    pub build: HandlerList,
    pub sign: HandlerList,
    pub unmarshal_meta: HandlerList,
    pub validate_response: HandlerList,
    pub unmarshal: HandlerList,
    pub unmarshal_error: HandlerList,
    pub retry: HandlerList,
}

pub fn validate_endpoint(req: &mut Request) {
    if req.service.endpoint.is_empty() {
        req.error = Some(Error::new(
            MISSING_ENDPOINT,
            "'endpoint' configuration is required for this service",
        ));
    }
}

pub fn user_agent(req: &mut Request) {
    req.headers
        .insert(USER_AGENT, HeaderValue::from_static(SDK_USER_AGENT));
}

pub fn request_id(req: &mut Request) {
    let id = Uuid::new_v4().to_string();
    match HeaderValue::from_str(&id) {
        Ok(value) => {
            req.headers
                .insert(HeaderName::from_static("x-ksc-request-id"), value);
            req.request_id = id;
        }
        Err(_) => {
            // a hyphenated UUID is always a valid header value
        }
    }
}

pub fn common_headers(req: &mut Request) {
    let service = Arc::clone(&req.service);
    req.headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );
    match HeaderValue::from_str(&service.endpoint) {
        Ok(value) => {
            req.headers
                .insert(HeaderName::from_static("klog-host"), value);
        }
        Err(err) => {
            req.error = Some(
                Error::new(MISSING_ENDPOINT, "endpoint is not a valid header value")
                    .with_source(err),
            );
            return;
        }
    }
    req.headers.insert(
        HeaderName::from_static("x-klog-api-version"),
        HeaderValue::from_static(API_VERSION),
    );
    req.headers.insert(
        HeaderName::from_static("x-klog-signature-method"),
        HeaderValue::from_static("hmac-sha1"),
    );
}

/// Re-encode the original payload as an LZ4 frame and make it the request
/// body. Runs before checksumming and signing so both cover the compressed
/// bytes.
pub fn compress_lz4(req: &mut Request) {
    let mut encoder = FrameEncoder::new(Vec::new());
    if let Err(err) = encoder.write_all(&req.data) {
        req.error = Some(Error::new(COMPRESS_LZ4, "failed to write").with_source(err));
        return;
    }
    match encoder.finish() {
        Ok(compressed) => {
            req.body = Bytes::from(compressed);
            req.headers.insert(
                HeaderName::from_static("x-klog-compress-type"),
                HeaderValue::from_static("lz4"),
            );
        }
        Err(err) => {
            req.error = Some(Error::new(COMPRESS_LZ4, "failed to close").with_source(err));
        }
    }
}

/// Base64 MD5 of the body as it will be sent.
pub fn content_md5(req: &mut Request) {
    let sum = BASE64.encode(Md5::digest(&req.body));
    match HeaderValue::from_str(&sum) {
        Ok(value) => {
            req.headers
                .insert(HeaderName::from_static("content-md5"), value);
        }
        Err(_) => {
            // base64 output is always a valid header value
        }
    }
}

/// Honor an already-set `Content-Length`, otherwise derive it from the
/// body buffer.
pub fn build_content_length(req: &mut Request) {
    if req.headers.contains_key(CONTENT_LENGTH) {
        return;
    }
    req.headers
        .insert(CONTENT_LENGTH, HeaderValue::from(req.body.len() as u64));
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(rename = "ErrorCode", default)]
    error_code: String,
    #[serde(rename = "ErrorMessage", default)]
    error_message: String,
}

/// Classify a non-2xx response into a coded error, falling back to
/// `UnknownError` when the body is not the expected JSON shape.
pub fn validate_response(req: &mut Request) {
    let Some(response) = req.response.as_ref() else {
        req.error = Some(Error::new(UNKNOWN_ERROR, "unknown error, no response"));
        return;
    };
    let status = response.status.as_u16();
    if status < 300 {
        return;
    }
    match serde_json::from_slice::<ResponseMessage>(&response.body) {
        Ok(message) => {
            req.error = Some(Error::new(message.error_code, message.error_message));
        }
        Err(_) => {
            req.error = Some(Error::new(
                UNKNOWN_ERROR,
                format!("unknown error, code={status}"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Klog;
    use crate::config::Config;
    use crate::credentials::Credentials;
    use crate::request::ResponseData;
    use reqwest::StatusCode;
    use std::io::Read;

    fn test_request(body: &[u8]) -> Request {
        let klog = Klog::new(&Config {
            credentials: Some(Arc::new(Credentials::new_static("AK", "SK", ""))),
            endpoint: "127.0.0.1:8010".to_string(),
            ..Config::default()
        });
        klog.put_logs_request(body.to_vec(), "basic", "basic", None)
    }

    #[test]
    fn test_user_agent_and_common_headers() {
        let mut req = test_request(b"payload");
        user_agent(&mut req);
        common_headers(&mut req);

        assert!(req
            .headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("klog-sdk/"));
        assert_eq!(
            req.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-protobuf"
        );
        assert_eq!(req.headers.get("klog-host").unwrap(), "http://127.0.0.1:8010");
        assert_eq!(req.headers.get("x-klog-api-version").unwrap(), "0.1.0");
        assert_eq!(
            req.headers.get("x-klog-signature-method").unwrap(),
            "hmac-sha1"
        );
    }

    #[test]
    fn test_request_id_is_fresh_per_request() {
        let mut first = test_request(b"payload");
        let mut second = test_request(b"payload");
        request_id(&mut first);
        request_id(&mut second);
        assert!(!first.request_id.is_empty());
        assert_ne!(first.request_id, second.request_id);
        assert_eq!(
            first.headers.get("x-ksc-request-id").unwrap().to_str().unwrap(),
            first.request_id
        );
    }

    #[test]
    fn test_compress_lz4_round_trips() {
        let payload = b"some log payload that compresses".repeat(16);
        let mut req = test_request(&payload);
        compress_lz4(&mut req);

        assert!(req.error.is_none());
        assert_eq!(req.headers.get("x-klog-compress-type").unwrap(), "lz4");
        assert_ne!(req.body.as_ref(), payload.as_slice());

        let mut decoder = lz4_flex::frame::FrameDecoder::new(req.body.as_ref());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn test_content_md5_covers_current_body() {
        let mut req = test_request(b"payload");
        compress_lz4(&mut req);
        content_md5(&mut req);

        let expected = BASE64.encode(Md5::digest(&req.body));
        assert_eq!(
            req.headers.get("content-md5").unwrap().to_str().unwrap(),
            expected
        );
    }

    #[test]
    fn test_content_length_honors_preset_header() {
        let mut req = test_request(b"payload");
        req.headers
            .insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        build_content_length(&mut req);
        assert_eq!(req.headers.get(CONTENT_LENGTH).unwrap(), "42");

        let mut req = test_request(b"payload");
        build_content_length(&mut req);
        assert_eq!(req.headers.get(CONTENT_LENGTH).unwrap(), "7");
    }

    #[test]
    fn test_validate_response_parses_coded_error() {
        let mut req = test_request(b"payload");
        req.response = Some(ResponseData {
            status: StatusCode::BAD_REQUEST,
            body: Bytes::from_static(
                br#"{"ErrorCode":"PostBodyInvalid","ErrorMessage":"bad body"}"#,
            ),
        });
        validate_response(&mut req);
        let err = req.error.unwrap();
        assert!(err.is("PostBodyInvalid"));
        assert_eq!(err.message(), "bad body");
    }

    #[test]
    fn test_validate_response_unknown_on_garbage_body() {
        let mut req = test_request(b"payload");
        req.response = Some(ResponseData {
            status: StatusCode::BAD_GATEWAY,
            body: Bytes::from_static(b"<html>bad gateway</html>"),
        });
        validate_response(&mut req);
        let err = req.error.unwrap();
        assert!(err.is(UNKNOWN_ERROR));
        assert!(err.message().contains("502"));
    }

    #[test]
    fn test_validate_response_passes_2xx() {
        let mut req = test_request(b"payload");
        req.response = Some(ResponseData {
            status: StatusCode::OK,
            body: Bytes::new(),
        });
        validate_response(&mut req);
        assert!(req.error.is_none());
    }

    #[test]
    fn test_handler_list_order() {
        fn first(req: &mut Request) {
            req.request_id.push('a');
        }
        fn second(req: &mut Request) {
            req.request_id.push('b');
        }

        let mut list = HandlerList::default();
        list.push_back(second);
        list.push_front(first);

        let mut req = test_request(b"payload");
        list.run(&mut req);
        assert_eq!(req.request_id, "ab");
    }
}
