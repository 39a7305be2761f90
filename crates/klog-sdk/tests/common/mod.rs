// Shared between the integration test binaries; not every binary uses
// every helper.
#![allow(dead_code)]

pub mod mock_server;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use klog_protos::{Content, Log};
use klog_sdk::worker::Callback;
use klog_sdk::{Config, Credentials, Error};

pub const AK: &str = "AKLTtestAccessKey";
pub const SK: &str = "testSecretKeytestSecretKey";

/// Install the env-filtered test subscriber. Safe to call from every
/// test; only the first call in a binary wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Every integration test builds its configuration through here, which
/// doubles as the harness entry point for the test subscriber.
pub fn test_config(endpoint: String) -> Config {
    init_tracing();
    Config {
        credentials: Some(Arc::new(Credentials::new_static(AK, SK, ""))),
        endpoint,
        ..Config::default()
    }
}

pub fn make_log() -> Log {
    Log::new(
        1_700_000_000,
        vec![Content::new("key1", "test1"), Content::new("key2", "test2")],
    )
}

/// One observed callback invocation: the record's sequence number and the
/// error code it was delivered with, if any.
pub type CallbackEvent = (u64, Option<String>);

/// Collects worker callback invocations for assertion.
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    events: Arc<Mutex<Vec<CallbackEvent>>>,
}

impl CallbackRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> Callback {
        let events = Arc::clone(&self.events);
        Arc::new(move |_log: &Log, seq_no: u64, err: Option<&Error>| {
            events
                .lock()
                .unwrap()
                .push((seq_no, err.map(|e| e.code().to_string())));
        })
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Poll until at least `count` callbacks arrived or the timeout passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.events.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.events.lock().unwrap().len() >= count
    }
}

/// Poll an arbitrary condition until it holds or the timeout passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
