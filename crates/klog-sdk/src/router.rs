//! Fan-out over many (project, log pool) destinations.

use dashmap::DashMap;
use klog_protos::Log;

use crate::config::Config;
use crate::worker::{AsyncClient, AsyncClientOptions, Callback};

pub struct AsyncMultiPoolClientOptions {
    pub callback: Option<Callback>,
    pub drop_if_pool_not_exists: bool,
    /// Per-destination queue capacity; 0 means the default.
    pub queue_size: usize,
}

/// Routes records to one lazily-created [`AsyncClient`] per destination.
/// Workers are independent: a slow or stuck destination never blocks the
/// others.
pub struct AsyncMultiPoolClient {
    clients: DashMap<String, std::sync::Arc<AsyncClient>>,
    config: Config,
    options: AsyncMultiPoolClientOptions,
}

impl AsyncMultiPoolClient {
    pub fn new(options: AsyncMultiPoolClientOptions, config: &Config) -> AsyncMultiPoolClient {
        AsyncMultiPoolClient {
            clients: DashMap::new(),
            config: config.clone(),
            options,
        }
    }

    /// Enqueue one record for a destination, creating its worker on first
    /// use. The map entry is taken atomically, so concurrent first pushes
    /// for the same destination publish exactly one worker.
    pub async fn push_log(&self, project_name: &str, log_pool_name: &str, log: Log) -> u64 {
        let key = format!("{project_name}\u{1}{log_pool_name}");
        let client = self
            .clients
            .entry(key)
            .or_insert_with(|| {
                std::sync::Arc::new(AsyncClient::new(
                    AsyncClientOptions {
                        project_name: project_name.to_string(),
                        log_pool_name: log_pool_name.to_string(),
                        callback: self.options.callback.clone(),
                        drop_if_pool_not_exists: self.options.drop_if_pool_not_exists,
                        queue_size: self.options.queue_size,
                    },
                    &self.config,
                ))
            })
            .clone();
        client.push_log(log).await
    }

    /// Stop every worker: cancel them all first so shutdown overlaps, then
    /// wait. Total stop time is bounded by the slowest single destination,
    /// not the sum.
    pub async fn stop(&self) {
        let clients: Vec<_> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for client in &clients {
            client.stop(false).await;
        }
        for client in &clients {
            client.wait().await;
        }
    }
}
