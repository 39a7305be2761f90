//! # klog SDK
//!
//! Client library for the klog structured-log ingestion service. Producers
//! hand it individual records tagged for a (project, log pool) destination;
//! the client batches, compresses, signs, and transmits them over HTTP(S),
//! retrying transient failures and shedding permanently-invalid records.
//!
//! ## Overview
//!
//! Three entry points, lowest-level first:
//! - [`Klog`]: the synchronous client; one `put_logs` call is one signed,
//!   compressed PutLogs request with bounded retries.
//! - [`AsyncClient`]: a per-destination worker that batches pushed records
//!   by size, count, and age, and reports per-record outcomes through a
//!   callback.
//! - [`AsyncMultiPoolClient`]: routes records to one worker per
//!   destination, created lazily.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use klog_sdk::{AsyncClient, AsyncClientOptions, Config, Credentials};
//! use klog_sdk::protos::{Content, Log};
//!
//! # async fn example() {
//! let client = AsyncClient::new(
//!     AsyncClientOptions {
//!         project_name: "my-project".to_string(),
//!         log_pool_name: "my-pool".to_string(),
//!         callback: Some(Arc::new(|_log, seq_no, err| {
//!             if let Some(err) = err {
//!                 eprintln!("log {seq_no} dropped: {err}");
//!             }
//!         })),
//!         drop_if_pool_not_exists: false,
//!         queue_size: 0,
//!     },
//!     &Config {
//!         credentials: Some(Arc::new(Credentials::new_static("AK", "SK", ""))),
//!         endpoint: "klog.example.com:8010".to_string(),
//!         ..Config::default()
//!     },
//! );
//!
//! client
//!     .push_log(Log::new(1_700_000_000, vec![Content::new("level", "info")]))
//!     .await;
//! client.stop(true).await;
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod request;
pub mod router;
pub mod service;
pub mod sign;
mod util;
pub mod worker;

pub use klog_protos as protos;

pub use client::Klog;
pub use config::{CompressMethod, Config, DEFAULT_RETRIES};
pub use credentials::Credentials;
pub use error::Error;
pub use router::{AsyncMultiPoolClient, AsyncMultiPoolClientOptions};
pub use worker::{
    check_log, AsyncClient, AsyncClientOptions, Callback, DEFAULT_QUEUE_SIZE,
    LOG_GROUP_SIZE_TO_SEND, MAX_BULK_SIZE, MAX_KEY_COUNT, MAX_KEY_SIZE, MAX_LOG_GROUP_SIZE,
    MAX_LOG_SIZE, MAX_VALUE_SIZE,
};
