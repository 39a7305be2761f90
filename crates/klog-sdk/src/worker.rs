//! Per-destination asynchronous client.
//!
//! One worker task owns one (project, log pool) destination. Producers
//! enqueue single records through a bounded channel; the worker is the only
//! writer to its batch buffers. Batches form by byte size, record count,
//! and age, and every record gets exactly one callback: success once its
//! batch is accepted, or an error when it is shed.
//!
//! ```text
//!   push_log ──> bounded queue ──> worker loop ──> batch buffer
//!                                      │               │
//!                                  200ms tick      flush: PutLogs
//!                                      │               │
//!                                      └── cancel ──> callbacks
//! ```
//!
//! Delivery policy on flush failure:
//! - record-invalid codes: re-validate locally, shed offenders, retry rest
//! - destination missing + drop-if-missing: deliver as success, stop
//! - anything else: retry forever with capped random-exponent backoff,
//!   until success or cancellation

use std::sync::Arc;
use std::time::Duration;

use klog_protos::{Log, LogGroup};
use prost::Message;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::Klog;
use crate::config::Config;
use crate::error::{
    Error, INVALID_UTF8_IN_KEY, INVALID_UTF8_IN_VALUE, MAX_KEY_COUNT_EXCEEDED,
    MAX_KEY_SIZE_EXCEEDED, MAX_LOG_SIZE_EXCEEDED, MAX_VALUE_SIZE_EXCEEDED,
};
use crate::util;

/// Most content pairs allowed in one record.
pub const MAX_KEY_COUNT: usize = 900;
/// Largest key, in bytes.
pub const MAX_KEY_SIZE: usize = 1 << 20;
/// Largest value, in bytes.
pub const MAX_VALUE_SIZE: usize = 1 << 20;
/// Most records in one batch.
pub const MAX_BULK_SIZE: usize = 4 << 10;
/// Largest serialized record, in bytes.
pub const MAX_LOG_SIZE: usize = 3_000_000;
/// Largest serialized batch, in bytes.
pub const MAX_LOG_GROUP_SIZE: usize = 3_000_000;
/// Batch size at which a flush is triggered without waiting for age.
pub const LOG_GROUP_SIZE_TO_SEND: usize = 2_000_000;

pub const DEFAULT_QUEUE_SIZE: usize = 2048;

const TICK_INTERVAL: Duration = Duration::from_millis(200);
const SEND_IDLE_THRESHOLD: Duration = Duration::from_secs(2);

/// Invoked exactly once per pushed record: `err` is `None` once the record
/// was accepted by the server (or deliberately dropped as success), and the
/// shedding error otherwise. `seq_no` matches the `push_log` return value.
pub type Callback = Arc<dyn Fn(&Log, u64, Option<&Error>) + Send + Sync>;

pub struct AsyncClientOptions {
    pub project_name: String,
    pub log_pool_name: String,
    pub callback: Option<Callback>,
    /// Treat a missing destination as success instead of retrying forever.
    pub drop_if_pool_not_exists: bool,
    /// 0 means the default of 2048.
    pub queue_size: usize,
}

struct Event {
    seq_no: u64,
    log: Log,
}

/// Handle to one destination's worker task.
pub struct AsyncClient {
    pub project_name: String,
    pub log_pool_name: String,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncClient {
    /// Spawn the worker task. Must be called within a tokio runtime.
    pub fn new(options: AsyncClientOptions, config: &Config) -> AsyncClient {
        let queue_size = if options.queue_size == 0 {
            DEFAULT_QUEUE_SIZE
        } else {
            options.queue_size
        };
        let (tx, rx) = mpsc::channel(queue_size);
        let cancel = CancellationToken::new();

        let worker = Worker {
            klog: Klog::new(config),
            project_name: options.project_name.clone(),
            log_pool_name: options.log_pool_name.clone(),
            callback: options.callback,
            drop_if_pool_not_exists: options.drop_if_pool_not_exists,
            rx,
            cancel: cancel.clone(),
            buf: Vec::new(),
            id_buf: Vec::new(),
            buf_size: 0,
            last_send_at: Instant::now(),
        };
        let join = tokio::spawn(worker.run());

        AsyncClient {
            project_name: options.project_name,
            log_pool_name: options.log_pool_name,
            tx,
            cancel,
            join: Mutex::new(Some(join)),
        }
    }

    /// Enqueue one record and return its sequence number, used to correlate
    /// the eventual callback. Blocks when the queue is full: back-pressure
    /// is deliberate, records are never shed at the producer side.
    pub async fn push_log(&self, log: Log) -> u64 {
        let seq_no = util::next_seq_no();
        if self.tx.send(Event { seq_no, log }).await.is_err() {
            // the worker already stopped; the record cannot be delivered
            error!(
                "klog async client: push after stop, dropping record, project={}, pool={}, seq_no={}",
                self.project_name, self.log_pool_name, seq_no
            );
        }
        seq_no
    }

    /// Cancel the worker. With `wait`, block until its loop has exited; an
    /// in-flight flush observes the cancellation at its next await point.
    pub async fn stop(&self, wait: bool) {
        self.cancel.cancel();
        if wait {
            self.wait().await;
        }
    }

    pub(crate) async fn wait(&self) {
        let handle = self.join.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("klog async client: worker task failed: {err}");
            }
        }
    }
}

/// Validate one record against the per-record invariants. The same checks
/// the server applies, run locally so invalid records can be shed before
/// (or between) transmission attempts.
pub fn check_log(log: &Log) -> Result<(), Error> {
    if log.contents.len() > MAX_KEY_COUNT {
        return Err(Error::new(
            MAX_KEY_COUNT_EXCEEDED,
            format!(
                "the amount[{}] of keys in one log should not be greater than {}",
                log.contents.len(),
                MAX_KEY_COUNT
            ),
        ));
    }
    for content in &log.contents {
        if std::str::from_utf8(&content.key).is_err() {
            return Err(Error::new(INVALID_UTF8_IN_KEY, "invalid UTF-8 in key"));
        }
        if std::str::from_utf8(&content.value).is_err() {
            return Err(Error::new(INVALID_UTF8_IN_VALUE, "invalid UTF-8 in value"));
        }
        if content.key.len() > MAX_KEY_SIZE {
            return Err(Error::new(
                MAX_KEY_SIZE_EXCEEDED,
                format!(
                    "the size[{}] of a key should not be greater than {}",
                    content.key.len(),
                    MAX_KEY_SIZE
                ),
            ));
        }
        if content.value.len() > MAX_VALUE_SIZE {
            return Err(Error::new(
                MAX_VALUE_SIZE_EXCEEDED,
                format!(
                    "the size[{}] of a value should not be greater than {}",
                    content.value.len(),
                    MAX_VALUE_SIZE
                ),
            ));
        }
    }
    Ok(())
}

struct Worker {
    klog: Klog,
    project_name: String,
    log_pool_name: String,
    callback: Option<Callback>,
    drop_if_pool_not_exists: bool,
    rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    buf: Vec<Log>,
    id_buf: Vec<u64>,
    buf_size: usize,
    last_send_at: Instant,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = interval(TICK_INTERVAL);
        ticker.tick().await; // discard the immediate first tick
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => return,
                },
                _ = ticker.tick() => {
                    if self.last_send_at.elapsed() > SEND_IDLE_THRESHOLD && !self.buf.is_empty() {
                        self.flush().await;
                    }
                }
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        let size = event.log.encoded_len();
        if size > MAX_LOG_SIZE {
            // too large to ever transmit; never buffered
            self.deliver(
                &event.log,
                event.seq_no,
                Some(&Error::new(
                    MAX_LOG_SIZE_EXCEEDED,
                    format!(
                        "the size of this log is {size} and the MaxLogSize is {MAX_LOG_SIZE}"
                    ),
                )),
            );
            return;
        }
        if self.buf_size + size > MAX_LOG_GROUP_SIZE {
            // this record would push the batch over the wire limit; ship
            // what we have first
            self.flush().await;
        }

        self.buf.push(event.log);
        self.id_buf.push(event.seq_no);
        self.buf_size += size;
        if self.buf_size >= LOG_GROUP_SIZE_TO_SEND || self.buf.len() >= MAX_BULK_SIZE {
            self.flush().await;
        }
    }

    /// Drain the buffer through one PutLogs attempt loop. Whatever path this
    /// returns by, every record present at entry has received exactly one
    /// callback and the buffers are reset.
    async fn flush(&mut self) {
        let mut attempt: u32 = 0;
        let final_err: Option<Error> = loop {
            let group = LogGroup {
                logs: self.buf.clone(),
                ..LogGroup::default()
            };

            let err = match self
                .klog
                .put_logs_with_cancellation(
                    &group,
                    &self.project_name,
                    &self.log_pool_name,
                    Some(self.cancel.clone()),
                )
                .await
            {
                Ok(()) => break None,
                Err(err) => err,
            };

            if err.requires_revalidation() {
                // some records can never be sent; shed them and keep the rest
                self.remove_invalid_logs();
                if self.buf.is_empty() {
                    break None;
                }
                if err.is_invalid_utf8_wire() {
                    continue;
                }
            } else if err.is_pool_missing() && self.drop_if_pool_not_exists {
                // destination is gone and the caller opted into silent drops
                break None;
            }

            error!(
                "klog async client: sleep then retry, project={}, pool={}, err={}",
                self.project_name, self.log_pool_name, err
            );

            attempt += 1;
            let delay = util::random_backoff(attempt);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    info!(
                        "klog async client: cancel received, stop retry, project={}, pool={}",
                        self.project_name, self.log_pool_name
                    );
                    break Some(err);
                }
            }
        };

        for (log, seq_no) in self.buf.iter().zip(self.id_buf.iter()) {
            self.deliver(log, *seq_no, final_err.as_ref());
        }
        self.buf.clear();
        self.id_buf.clear();
        self.buf_size = 0;
        self.last_send_at = Instant::now();
    }

    /// Re-run the per-record invariants over the buffer, delivering an error
    /// callback for every record that fails and keeping the rest in order.
    fn remove_invalid_logs(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        let id_buf = std::mem::take(&mut self.id_buf);
        for (log, seq_no) in buf.into_iter().zip(id_buf) {
            match check_log(&log) {
                Err(err) => self.deliver(&log, seq_no, Some(&err)),
                Ok(()) => {
                    self.buf.push(log);
                    self.id_buf.push(seq_no);
                }
            }
        }
    }

    fn deliver(&self, log: &Log, seq_no: u64, err: Option<&Error>) {
        if let Some(callback) = &self.callback {
            callback(log, seq_no, err);
        }
    }
}
