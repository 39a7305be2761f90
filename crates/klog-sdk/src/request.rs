//! A single API request and its send/retry state machine.
//!
//! The built artifact (URL, headers, body) is constructed exactly once per
//! request; the attempt state (retry counter, classified error, current
//! response, tri-state retryable flag) mutates across attempts. `send()`
//! drives the phases: sign (validate + build memoized once + sign
//! handlers), the HTTP exchange, response validation, and the retry
//! decision, looping until success or an unrecoverable error.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, REQUEST_ERROR};
use crate::service::Service;

/// A service API operation to be made.
#[derive(Clone, Debug)]
pub struct Operation {
    pub name: &'static str,
    pub method: Method,
    pub path: &'static str,
    pub params: Vec<(String, String)>,
}

/// The received response: status plus fully-read body bytes.
#[derive(Clone, Debug)]
pub struct ResponseData {
    pub status: StatusCode,
    pub body: Bytes,
}

pub struct Request {
    pub service: Arc<Service>,
    pub operation: Operation,
    /// Canonical request time; the signing timestamp.
    pub time: DateTime<Utc>,
    /// Resolved during build, after endpoint validation.
    pub url: Option<Url>,
    pub headers: HeaderMap,
    pub request_id: String,
    /// The original serialized payload, untouched by compression.
    pub(crate) data: Bytes,
    /// The body as it will go on the wire.
    pub body: Bytes,
    pub error: Option<Error>,
    pub response: Option<ResponseData>,
    pub retry_count: u32,
    /// Tri-state: `None` = undecided, `Some(_)` = a handler has ruled.
    pub retryable: Option<bool>,
    pub retry_delay: Duration,
    built: bool,
    cancel: Option<CancellationToken>,
}

impl Request {
    pub(crate) fn new(
        service: Arc<Service>,
        operation: Operation,
        inputs: Vec<u8>,
        cancel: Option<CancellationToken>,
    ) -> Request {
        let data = Bytes::from(inputs);
        Request {
            service,
            operation,
            time: Utc::now(),
            url: None,
            headers: HeaderMap::new(),
            request_id: String::new(),
            body: data.clone(),
            data,
            error: None,
            response: None,
            retry_count: 0,
            retryable: None,
            retry_delay: Duration::ZERO,
            built: false,
            cancel,
        }
    }

    /// Whether the current attempt will be retried.
    pub fn will_retry(&self) -> bool {
        self.error.is_some()
            && self.retryable == Some(true)
            && self.retry_count < self.service.max_retries()
    }

    /// Validate and build the request exactly once; repeated calls are
    /// no-ops so retries re-send the same built artifact.
    pub(crate) fn build(&mut self) {
        if self.built {
            return;
        }
        let service = Arc::clone(&self.service);

        self.error = None;
        service.handlers.validate.run(self);
        if self.error.is_some() {
            return;
        }

        // the endpoint passed validation, so the URL is resolvable now
        let url = format!("{}{}", service.endpoint, self.operation.path);
        match Url::parse_with_params(&url, &self.operation.params) {
            Ok(url) => self.url = Some(url),
            Err(err) => {
                self.error =
                    Some(Error::new(REQUEST_ERROR, "invalid request URL").with_source(err));
                return;
            }
        }

        service.handlers.build.run(self);
        self.built = true;
    }

    pub(crate) fn sign(&mut self) {
        self.build();
        if self.error.is_some() {
            return;
        }
        let service = Arc::clone(&self.service);
        service.handlers.sign.run(self);
    }

    /// Send the request, retrying per the service policy. Returns the first
    /// unrecoverable error once retries are exhausted.
    pub async fn send(&mut self) -> Result<(), Error> {
        let service = Arc::clone(&self.service);
        loop {
            self.sign();
            if let Some(err) = self.error.clone() {
                return Err(err);
            }

            // Bodies are in-memory buffers, so a retry re-sends the same
            // bytes; there is no stream position to rewind.
            self.retryable = None;

            self.transmit().await;
            if self.error.is_some() {
                service.handlers.retry.run(self);
                self.after_retry().await;
                if let Some(err) = self.error.clone() {
                    return Err(err);
                }
                continue;
            }

            service.handlers.unmarshal_meta.run(self);
            service.handlers.validate_response.run(self);
            if self.error.is_some() {
                service.handlers.unmarshal_error.run(self);
                service.handlers.retry.run(self);
                self.after_retry().await;
                if let Some(err) = self.error.clone() {
                    return Err(err);
                }
                continue;
            }

            service.handlers.unmarshal.run(self);
            if self.error.is_some() {
                service.handlers.retry.run(self);
                self.after_retry().await;
                if let Some(err) = self.error.clone() {
                    return Err(err);
                }
                continue;
            }

            break;
        }
        Ok(())
    }

    /// One HTTP exchange. Transport failures are classified `RequestError`
    /// and marked retryable; cancellation aborts the in-flight exchange.
    async fn transmit(&mut self) {
        let service = Arc::clone(&self.service);
        let Some(url) = self.url.clone() else {
            self.error = Some(Error::new(REQUEST_ERROR, "request URL missing"));
            return;
        };
        self.response = None;

        if service.config.debug {
            debug!(
                "sending {} {} ({} body bytes), headers: {:?}",
                self.operation.method,
                url,
                self.body.len(),
                self.headers
            );
        }

        let request = service
            .http_client
            .request(self.operation.method.clone(), url)
            .headers(self.headers.clone())
            .body(self.body.clone());

        let result = match self.cancel.clone() {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    self.error = Some(Error::new(REQUEST_ERROR, "request cancelled"));
                    self.retryable = Some(true);
                    return;
                }
                result = request.send() => result,
            },
            None => request.send().await,
        };

        match result {
            Ok(response) => {
                let status = response.status();
                match response.bytes().await {
                    Ok(body) => {
                        if service.config.debug {
                            debug!(
                                "received response, status={status}, {} body bytes",
                                body.len()
                            );
                        }
                        self.response = Some(ResponseData { status, body });
                    }
                    Err(err) => {
                        self.error = Some(
                            Error::new(REQUEST_ERROR, "failed to read response body")
                                .with_source(err),
                        );
                        self.retryable = Some(true);
                    }
                }
            }
            Err(err) => {
                self.error =
                    Some(Error::new(REQUEST_ERROR, "send request failed").with_source(err));
                self.retryable = Some(true);
            }
        }
    }

    /// Decide whether this attempt retries and, when it does, wait out the
    /// delay, refresh expired credentials, and clear the error so the send
    /// loop re-runs.
    async fn after_retry(&mut self) {
        let service = Arc::clone(&self.service);
        if self.retryable.is_none() {
            self.retryable = Some(service.should_retry(self));
        }

        if self.will_retry() {
            self.retry_delay = service.retry_delay(self);
            let interrupted = match self.cancel.clone() {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => true,
                    _ = tokio::time::sleep(self.retry_delay) => false,
                },
                None => {
                    tokio::time::sleep(self.retry_delay).await;
                    false
                }
            };
            if interrupted {
                // keep the error; the caller observes the cancellation
                return;
            }

            if let Some(err) = &self.error {
                if err.is_expired_creds() {
                    service.credentials.expire();
                }
            }

            self.retry_count += 1;
            self.error = None;
        }
    }
}
