//! Credential resolution for request signing.
//!
//! A [`Credentials`] value wraps a provider behind a concurrency-safe cache
//! shared by every worker. `get()` returns the cached value until
//! `expire()` is called (the request pipeline does so when the server
//! reports an expired-token code), at which point the next `get()`
//! re-fetches from the provider.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::Error;

pub const ENV_ACCESS_KEY_ID: &str = "KLOG_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "KLOG_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "KLOG_SESSION_TOKEN";
pub const ENV_SHARED_CREDENTIALS_FILE: &str = "KLOG_SHARED_CREDENTIALS_FILE";
pub const ENV_PROFILE: &str = "KLOG_PROFILE";

const DEFAULT_CREDENTIALS_PATH: &str = ".klog/credentials";
const DEFAULT_PROFILE: &str = "default";

/// An access-key credential set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Value {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
}

/// Source of credential values. Implementations must be safe to call from
/// multiple workers; caching happens in [`Credentials`], not here.
pub trait ProvideCredentials: Send + Sync {
    fn retrieve(&self) -> Result<Value, Error>;
}

/// Explicit, fixed credentials.
pub struct StaticProvider {
    pub value: Value,
}

impl ProvideCredentials for StaticProvider {
    fn retrieve(&self) -> Result<Value, Error> {
        Ok(self.value.clone())
    }
}

/// Credentials from `KLOG_ACCESS_KEY_ID` / `KLOG_SECRET_ACCESS_KEY`
/// (optionally `KLOG_SESSION_TOKEN`).
pub struct EnvProvider;

impl ProvideCredentials for EnvProvider {
    fn retrieve(&self) -> Result<Value, Error> {
        let access_key_id = env::var(ENV_ACCESS_KEY_ID).unwrap_or_default();
        let secret_access_key = env::var(ENV_SECRET_ACCESS_KEY).unwrap_or_default();
        if access_key_id.is_empty() {
            return Err(Error::new(
                "EnvAccessKeyNotFound",
                format!("{ENV_ACCESS_KEY_ID} not found in environment"),
            ));
        }
        if secret_access_key.is_empty() {
            return Err(Error::new(
                "EnvSecretNotFound",
                format!("{ENV_SECRET_ACCESS_KEY} not found in environment"),
            ));
        }
        Ok(Value {
            access_key_id,
            secret_access_key,
            session_token: env::var(ENV_SESSION_TOKEN).unwrap_or_default(),
        })
    }
}

/// Credentials from an INI-style shared file.
///
/// Empty `filename` resolves to `$KLOG_SHARED_CREDENTIALS_FILE`, then
/// `$HOME/.klog/credentials`; empty `profile` resolves to `$KLOG_PROFILE`,
/// then `default`.
pub struct SharedCredentialsProvider {
    pub filename: String,
    pub profile: String,
}

impl SharedCredentialsProvider {
    fn resolved_filename(&self) -> Result<PathBuf, Error> {
        if !self.filename.is_empty() {
            return Ok(PathBuf::from(&self.filename));
        }
        if let Ok(path) = env::var(ENV_SHARED_CREDENTIALS_FILE) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        match env::var("HOME") {
            Ok(home) if !home.is_empty() => Ok(PathBuf::from(home).join(DEFAULT_CREDENTIALS_PATH)),
            _ => Err(Error::new(
                "SharedCredsLoad",
                "HOME not set, cannot locate the shared credentials file",
            )),
        }
    }

    fn resolved_profile(&self) -> String {
        if !self.profile.is_empty() {
            return self.profile.clone();
        }
        match env::var(ENV_PROFILE) {
            Ok(profile) if !profile.is_empty() => profile,
            _ => DEFAULT_PROFILE.to_string(),
        }
    }
}

impl ProvideCredentials for SharedCredentialsProvider {
    fn retrieve(&self) -> Result<Value, Error> {
        let path = self.resolved_filename()?;
        let profile = self.resolved_profile();
        let contents = fs::read_to_string(&path).map_err(|e| {
            Error::new(
                "SharedCredsLoad",
                format!("failed to load shared credentials file {}", path.display()),
            )
            .with_source(e)
        })?;

        let value = parse_profile(&contents, &profile).ok_or_else(|| {
            Error::new(
                "SharedCredsProfileNotFound",
                format!("profile [{profile}] not found in {}", path.display()),
            )
        })?;
        if value.access_key_id.is_empty() || value.secret_access_key.is_empty() {
            return Err(Error::new(
                "SharedCredsAccessKey",
                format!("profile [{profile}] is missing an access key or secret"),
            ));
        }
        Ok(value)
    }
}

fn parse_profile(contents: &str, profile: &str) -> Option<Value> {
    let mut in_profile = false;
    let mut found = false;
    let mut value = Value::default();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            found |= in_profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let val = val.trim().to_string();
            match key.trim() {
                "klog_access_key_id" => value.access_key_id = val,
                "klog_secret_access_key" => value.secret_access_key = val,
                "klog_session_token" => value.session_token = val,
                _ => {}
            }
        }
    }
    found.then_some(value)
}

/// First provider in the list that succeeds wins.
pub struct ChainProvider {
    pub providers: Vec<Box<dyn ProvideCredentials>>,
}

impl ProvideCredentials for ChainProvider {
    fn retrieve(&self) -> Result<Value, Error> {
        for provider in &self.providers {
            if let Ok(value) = provider.retrieve() {
                return Ok(value);
            }
        }
        Err(Error::new(
            "NoCredentialProviders",
            "no valid providers in chain",
        ))
    }
}

struct CacheState {
    value: Option<Value>,
    force_refresh: bool,
}

/// A provider plus a cache, safe for concurrent `get()` / `expire()`.
pub struct Credentials {
    provider: Box<dyn ProvideCredentials>,
    state: Mutex<CacheState>,
    anonymous: bool,
}

impl Credentials {
    pub fn new(provider: impl ProvideCredentials + 'static) -> Self {
        Credentials {
            provider: Box::new(provider),
            state: Mutex::new(CacheState {
                value: None,
                force_refresh: false,
            }),
            anonymous: false,
        }
    }

    pub fn new_static(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Credentials::new(StaticProvider {
            value: Value {
                access_key_id: access_key_id.into(),
                secret_access_key: secret_access_key.into(),
                session_token: session_token.into(),
            },
        })
    }

    /// The sentinel that skips request signing entirely.
    pub fn anonymous() -> Self {
        let mut creds = Credentials::new_static("", "", "");
        creds.anonymous = true;
        creds
    }

    /// The default lookup order: environment, then the shared file.
    pub fn default_chain() -> Self {
        Credentials::new(ChainProvider {
            providers: vec![
                Box::new(EnvProvider),
                Box::new(SharedCredentialsProvider {
                    filename: String::new(),
                    profile: String::new(),
                }),
            ],
        })
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// Cached credentials, re-fetched on first use and after `expire()`.
    pub fn get(&self) -> Result<Value, Error> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.force_refresh || state.value.is_none() {
            state.value = Some(self.provider.retrieve()?);
            state.force_refresh = false;
        }
        // value was just filled above if absent
        Ok(state.value.clone().unwrap_or_default())
    }

    /// Invalidate the cache so the next `get()` re-fetches.
    pub fn expire(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.force_refresh = true;
    }
}
