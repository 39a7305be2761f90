//! Resolved service state shared by every request of one client.
//!
//! `Service::new` merges user configuration over the defaults, resolves the
//! credential chain, the HTTP client, and the endpoint scheme, and installs
//! the handler chain the configuration calls for.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{CompressMethod, Config};
use crate::credentials::Credentials;
use crate::handlers::{self, Handlers};
use crate::request::Request;

pub const API_VERSION: &str = "0.1.0";
pub const SDK_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(30);

pub struct Service {
    pub config: Config,
    pub credentials: Arc<Credentials>,
    pub http_client: reqwest::Client,
    /// Scheme-resolved endpoint, e.g. `http://127.0.0.1:8010`.
    pub endpoint: String,
    pub handlers: Handlers,
}

impl Service {
    pub fn new(config: &Config) -> Service {
        let config = Config::service_defaults().merge(config);

        let credentials = config
            .credentials
            .clone()
            .unwrap_or_else(|| Arc::new(Credentials::default_chain()));
        let http_client = config.http_client.clone().unwrap_or_default();
        let endpoint = build_endpoint(&config);

        let mut handlers = Handlers::default();
        handlers.validate.push_back(handlers::validate_endpoint);
        handlers.build.push_back(handlers::user_agent);
        handlers.build.push_back(handlers::request_id);
        handlers.build.push_back(handlers::common_headers);
        if config.compress_method == CompressMethod::Lz4 {
            handlers.build.push_back(handlers::compress_lz4);
        }
        if !config.disable_compute_checksums {
            handlers.build.push_back(handlers::content_md5);
        }
        handlers.sign.push_back(handlers::build_content_length);
        handlers
            .validate_response
            .push_back(handlers::validate_response);

        Service {
            config,
            credentials,
            http_client,
            endpoint,
            handlers,
        }
    }

    /// Maximum retry count for one request; the `-1` config sentinel maps
    /// to the service default of 3.
    pub fn max_retries(&self) -> u32 {
        if self.config.max_retries < 0 {
            DEFAULT_MAX_RETRIES
        } else {
            self.config.max_retries as u32
        }
    }

    /// Default retry predicate: any 5xx status, or a code classified as
    /// retryable (transient transport, throttling, expired credentials).
    pub(crate) fn should_retry(&self, req: &Request) -> bool {
        if req
            .response
            .as_ref()
            .is_some_and(|response| response.status.as_u16() >= 500)
        {
            return true;
        }
        req.error
            .as_ref()
            .is_some_and(|err| err.is_retryable_code())
    }

    /// Delay before the next attempt of a synchronous request:
    /// `2^retry_count x 30ms`.
    pub(crate) fn retry_delay(&self, req: &Request) -> Duration {
        RETRY_BASE_DELAY * 2u32.saturating_pow(req.retry_count.min(20))
    }
}

fn build_endpoint(config: &Config) -> String {
    if config.endpoint.is_empty() || config.endpoint.contains("://") {
        return config.endpoint.clone();
    }
    let scheme = if config.disable_ssl { "http" } else { "https" };
    format!("{scheme}://{}", config.endpoint)
}
