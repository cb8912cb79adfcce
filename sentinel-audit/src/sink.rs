//! The append-only, batched JSON-lines audit sink: a bounded MPSC queue
//! drained by a single background task on a flush-interval-or-watermark
//! schedule, with retried writes and a degraded-health flag that never
//! drops a record silently.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use sentinel_protocol::AuditRecord;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::backoff::backoff;

const MAX_WRITE_RETRIES: u32 = 3;
const QUEUE_CAPACITY: usize = 4096;

/// Handle held by the Dispatcher. Cloning is cheap (an `mpsc::Sender`
/// clone); every clone feeds the same background writer task.
#[derive(Clone)]
pub struct AuditSink {
    sender: mpsc::Sender<AuditRecord>,
    degraded: watch::Receiver<bool>,
    pending: Arc<AtomicUsize>,
}

pub struct AuditSinkHandle {
    pub sink: AuditSink,
    pub task: JoinHandle<()>,
}

impl AuditSink {
    /// Spawns the background writer task and returns a handle plus the
    /// sink itself. `path`'s parent directory must already exist.
    pub fn spawn(path: PathBuf, flush_interval: std::time::Duration, high_watermark: usize) -> AuditSinkHandle {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let (degraded_tx, degraded_rx) = watch::channel(false);
        let pending = Arc::new(AtomicUsize::new(0));

        let writer = Writer {
            path,
            receiver,
            flush_interval,
            high_watermark,
            degraded_tx,
            pending: Arc::clone(&pending),
        };
        let task = tokio::spawn(writer.run());

        AuditSinkHandle {
            sink: AuditSink {
                sender,
                degraded: degraded_rx,
                pending,
            },
            task,
        }
    }

    /// Enqueues `record`. Backpressures (awaits) when the queue is full
    /// rather than dropping the record; per §4.7 this is a deliberate
    /// bounded stall on the Dispatcher, not data loss.
    pub async fn submit(&self, record: AuditRecord) {
        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(record).await.is_err() {
            error!("audit sink writer task is gone; record dropped");
        }
    }

    /// Whether the sink is currently in a degraded state (sustained write
    /// failure). Exposed for an external health-check surface.
    pub fn health(&self) -> bool {
        !*self.degraded.borrow()
    }

    pub fn queue_depth(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

struct Writer {
    path: PathBuf,
    receiver: mpsc::Receiver<AuditRecord>,
    flush_interval: std::time::Duration,
    high_watermark: usize,
    degraded_tx: watch::Sender<bool>,
    pending: Arc<AtomicUsize>,
}

impl Writer {
    async fn run(mut self) {
        let mut buffer: Vec<AuditRecord> = Vec::new();
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_record = self.receiver.recv() => {
                    match maybe_record {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= self.high_watermark {
                                self.flush(&mut buffer).await;
                            }
                        }
                        None => {
                            self.flush(&mut buffer).await;
                            info!("audit sink channel closed; writer exiting after final flush");
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut buffer).await;
                }
            }
        }
    }

    async fn flush(&mut self, buffer: &mut Vec<AuditRecord>) {
        if buffer.is_empty() {
            return;
        }

        let mut attempt = 0;
        loop {
            match self.write_batch(buffer).await {
                Ok(()) => {
                    self.pending.fetch_sub(buffer.len(), Ordering::Relaxed);
                    buffer.clear();
                    if *self.degraded_tx.borrow() {
                        info!("audit sink recovered from degraded state");
                        let _ = self.degraded_tx.send(false);
                    }
                    return;
                }
                Err(error) => {
                    attempt += 1;
                    warn!(attempt, %error, "audit write failed");
                    if attempt >= MAX_WRITE_RETRIES {
                        if !*self.degraded_tx.borrow() {
                            error!("audit sink entering degraded state; records remain queued");
                        }
                        let _ = self.degraded_tx.send(true);
                        return;
                    }
                    tokio::time::sleep(backoff(attempt)).await;
                }
            }
        }
    }

    async fn write_batch(&self, buffer: &[AuditRecord]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        let mut out = String::new();
        for record in buffer {
            let line = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
            out.push_str(&line);
            out.push('\n');
        }
        file.write_all(out.as_bytes()).await?;
        file.flush().await
    }
}
