//! Canonical-string HMAC-SHA1 request signing.
//!
//! The string to sign is the newline-joined sequence: HTTP method,
//! `Content-MD5`, `Content-Type`, the RFC 1123 GMT date, the sorted
//! `x-klog-*` header block (only when non-empty), and the request URI as it
//! appears on the wire. The signature is attached as
//! `Authorization: KLOG <access-key-id>:<base64 hmac>`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, DATE};
use reqwest::Url;
use sha1::Sha1;
use tracing::debug;

use crate::error::{Error, REQUEST_ERROR};
use crate::request::Request;

pub(crate) const TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const SIGN_HEADER_PREFIX: &str = "x-klog-";

/// Sign-phase handler. Skips entirely for anonymous credentials or when an
/// `Authorization` header is already present; always overwrites `Date`.
pub fn sign(req: &mut Request) {
    let service = Arc::clone(&req.service);
    if service.credentials.is_anonymous() {
        return;
    }
    if req.headers.contains_key(AUTHORIZATION) {
        return;
    }

    let creds = match service.credentials.get() {
        Ok(creds) => creds,
        Err(err) => {
            req.error = Some(err);
            return;
        }
    };

    let formatted_time = req.time.format(TIME_FORMAT).to_string();
    match HeaderValue::from_str(&formatted_time) {
        Ok(value) => {
            req.headers.insert(DATE, value);
        }
        Err(err) => {
            req.error = Some(
                Error::new(REQUEST_ERROR, "formatted date is not a valid header value")
                    .with_source(err),
            );
            return;
        }
    }

    let canonical_resource = match req.url.as_ref() {
        Some(url) => request_uri(url),
        None => {
            req.error = Some(Error::new(REQUEST_ERROR, "request URL missing at signing time"));
            return;
        }
    };

    let to_sign = string_to_sign(
        req.operation.method.as_str(),
        header_or_empty(&req.headers, "content-md5"),
        header_or_empty(&req.headers, CONTENT_TYPE.as_str()),
        &formatted_time,
        &canonical_headers(&req.headers),
        &canonical_resource,
    );

    if service.config.debug {
        debug!("string to sign:\n{to_sign}");
    }

    let signature = compute_signature(&creds.secret_access_key, &to_sign);
    let authorization = format!("KLOG {}:{}", creds.access_key_id, signature);
    match HeaderValue::from_str(&authorization) {
        Ok(value) => {
            req.headers.insert(AUTHORIZATION, value);
        }
        Err(err) => {
            req.error = Some(
                Error::new(REQUEST_ERROR, "credentials produce an invalid Authorization header")
                    .with_source(err),
            );
        }
    }
}

fn header_or_empty<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// The sorted `x-klog-*` block: one `<name>:<values joined by ','>` line
/// per header, lines joined with `\n`. Header names are already lowercase
/// in a `HeaderMap`.
pub(crate) fn canonical_headers(headers: &HeaderMap) -> String {
    let mut names: Vec<&str> = headers
        .keys()
        .map(|name| name.as_str())
        .filter(|name| name.starts_with(SIGN_HEADER_PREFIX))
        .collect();
    names.sort_unstable();

    let lines: Vec<String> = names
        .iter()
        .map(|name| {
            let values: Vec<&str> = headers
                .get_all(*name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            format!("{}:{}", name, values.join(","))
        })
        .collect();
    lines.join("\n")
}

pub(crate) fn string_to_sign(
    method: &str,
    content_md5: &str,
    content_type: &str,
    formatted_time: &str,
    canonical_headers: &str,
    canonical_resource: &str,
) -> String {
    let mut items = vec![
        method.to_uppercase(),
        content_md5.to_string(),
        content_type.to_string(),
        formatted_time.to_string(),
    ];
    if !canonical_headers.is_empty() {
        items.push(canonical_headers.to_string());
    }
    items.push(canonical_resource.to_string());
    items.join("\n")
}

pub(crate) fn compute_signature(secret_access_key: &str, string_to_sign: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret_access_key.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Path plus raw query, exactly as the request line will carry it.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
