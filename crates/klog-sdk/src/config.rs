//! Client configuration.
//!
//! User configuration merges over [`Config::service_defaults`] field by
//! field; an unset field (zero value / `None` / the `-1` retry sentinel)
//! keeps the default.

use std::sync::{Arc, OnceLock};

use crate::credentials::Credentials;

/// Sentinel meaning "use the service default retry count".
pub const DEFAULT_RETRIES: i32 = -1;

/// Payload compression applied during request build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressMethod {
    /// Unset; merging keeps the base value (the service default is lz4).
    #[default]
    None,
    Lz4,
}

#[derive(Clone)]
pub struct Config {
    pub credentials: Option<Arc<Credentials>>,
    pub endpoint: String,
    pub disable_ssl: bool,
    pub http_client: Option<reqwest::Client>,
    /// Dump request head, string-to-sign, and response head at debug level.
    pub debug: bool,
    pub max_retries: i32,
    pub disable_compute_checksums: bool,
    pub compress_method: CompressMethod,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            credentials: None,
            endpoint: String::new(),
            disable_ssl: false,
            http_client: None,
            debug: false,
            max_retries: DEFAULT_RETRIES,
            disable_compute_checksums: false,
            compress_method: CompressMethod::None,
        }
    }
}

fn default_http_client() -> reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new).clone()
}

impl Config {
    /// The defaults user configuration merges over.
    pub fn service_defaults() -> Config {
        Config {
            credentials: Some(Arc::new(Credentials::default_chain())),
            endpoint: String::new(),
            disable_ssl: true,
            http_client: Some(default_http_client()),
            debug: false,
            max_retries: DEFAULT_RETRIES,
            disable_compute_checksums: false,
            compress_method: CompressMethod::Lz4,
        }
    }

    /// Merge `newcfg` over `self`, field by field. A field whose value is
    /// unset in `newcfg` keeps the base value; boolean flags can therefore
    /// only be switched on, never cleared, through a merge.
    pub fn merge(&self, newcfg: &Config) -> Config {
        Config {
            credentials: newcfg
                .credentials
                .clone()
                .or_else(|| self.credentials.clone()),
            endpoint: if !newcfg.endpoint.is_empty() {
                newcfg.endpoint.clone()
            } else {
                self.endpoint.clone()
            },
            disable_ssl: if newcfg.disable_ssl {
                newcfg.disable_ssl
            } else {
                self.disable_ssl
            },
            http_client: newcfg
                .http_client
                .clone()
                .or_else(|| self.http_client.clone()),
            // The inequality comparison means debug is effectively always
            // taken from the override; with a false base it can only be
            // turned on explicitly.
            debug: if newcfg.debug != self.debug {
                newcfg.debug
            } else {
                self.debug
            },
            max_retries: if newcfg.max_retries != DEFAULT_RETRIES {
                newcfg.max_retries
            } else {
                self.max_retries
            },
            disable_compute_checksums: if newcfg.disable_compute_checksums {
                newcfg.disable_compute_checksums
            } else {
                self.disable_compute_checksums
            },
            compress_method: if newcfg.compress_method != CompressMethod::None {
                newcfg.compress_method
            } else {
                self.compress_method
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_defaults_for_unset_fields() {
        let merged = Config::service_defaults().merge(&Config::default());
        assert!(merged.credentials.is_some());
        assert!(merged.endpoint.is_empty());
        assert!(merged.disable_ssl);
        assert!(merged.http_client.is_some());
        assert!(!merged.debug);
        assert_eq!(merged.max_retries, DEFAULT_RETRIES);
        assert!(!merged.disable_compute_checksums);
        assert_eq!(merged.compress_method, CompressMethod::Lz4);
    }

    #[test]
    fn test_merge_takes_explicit_overrides() {
        let overrides = Config {
            credentials: Some(Arc::new(Credentials::new_static("AK", "SK", ""))),
            endpoint: "127.0.0.1:8010".to_string(),
            debug: true,
            max_retries: 5,
            disable_compute_checksums: true,
            ..Config::default()
        };
        let merged = Config::service_defaults().merge(&overrides);
        assert_eq!(merged.endpoint, "127.0.0.1:8010");
        assert!(merged.debug);
        assert_eq!(merged.max_retries, 5);
        assert!(merged.disable_compute_checksums);
        // unset compress method keeps the lz4 default
        assert_eq!(merged.compress_method, CompressMethod::Lz4);
    }

    #[test]
    fn test_merge_zero_retries_is_an_explicit_choice() {
        let overrides = Config {
            max_retries: 0,
            ..Config::default()
        };
        let merged = Config::service_defaults().merge(&overrides);
        assert_eq!(merged.max_retries, 0);
    }

    #[test]
    fn test_debug_follows_the_override() {
        let base = Config {
            debug: true,
            ..Config::service_defaults()
        };
        let merged = base.merge(&Config::default());
        assert!(!merged.debug);
    }
}
