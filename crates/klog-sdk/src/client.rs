//! The synchronous client.

use std::sync::Arc;

use klog_protos::LogGroup;
use prost::Message;
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Error;
use crate::request::{Operation, Request};
use crate::service::Service;
use crate::sign;

/// A klog API client. Cheap to clone; all state lives in the shared
/// [`Service`].
#[derive(Clone)]
pub struct Klog {
    pub service: Arc<Service>,
}

impl Klog {
    pub fn new(config: &Config) -> Klog {
        let mut service = Service::new(config);
        service.handlers.sign.push_back(sign::sign);
        Klog {
            service: Arc::new(service),
        }
    }

    /// Build the PutLogs request for an already-serialized log group.
    pub fn put_logs_request(
        &self,
        input: Vec<u8>,
        project_name: &str,
        log_pool_name: &str,
        cancel: Option<CancellationToken>,
    ) -> Request {
        let operation = Operation {
            name: "PutLogs",
            method: Method::POST,
            path: "/PutLogs",
            params: vec![
                ("ProjectName".to_string(), project_name.to_string()),
                ("LogPoolName".to_string(), log_pool_name.to_string()),
            ],
        };
        Request::new(Arc::clone(&self.service), operation, input, cancel)
    }

    /// Upload a batch of records to one log pool. Synchronous from the
    /// caller's point of view: returns after the request succeeded or its
    /// retries were exhausted.
    pub async fn put_logs(
        &self,
        group: &LogGroup,
        project_name: &str,
        log_pool_name: &str,
    ) -> Result<(), Error> {
        self.put_logs_with_cancellation(group, project_name, log_pool_name, None)
            .await
    }

    /// Like [`Klog::put_logs`], but the exchange and its retry sleeps abort
    /// when the token fires. The async worker plumbs its own token through
    /// here.
    pub async fn put_logs_with_cancellation(
        &self,
        group: &LogGroup,
        project_name: &str,
        log_pool_name: &str,
        cancel: Option<CancellationToken>,
    ) -> Result<(), Error> {
        let body = group.encode_to_vec();
        let mut req = self.put_logs_request(body, project_name, log_pool_name, cancel);
        req.send().await
    }
}
