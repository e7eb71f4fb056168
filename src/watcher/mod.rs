//! Live-tail hub: fans every published record out to the consumers
//! registered for its stream.
//!
//! One event loop owns the registry. Records and registrations reach it over
//! bounded channels, so consumers of one stream are served strictly in
//! publication order. A consumer that fails or stops reading for longer than
//! [`DELIVERY_TIMEOUT`] is evicted without affecting the others.

pub mod chunk;
pub mod consumer;

pub use chunk::{encode_chunk, frame};
pub use consumer::{Consumer, DELIVERY_TIMEOUT};

use crate::domain::LogRecord;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the record and command channels.
pub const CHANNEL_CAPACITY: usize = 1024;

const IDLE_TIMEOUT: Duration = Duration::from_millis(300);
const STOP_POLL_ATTEMPTS: usize = 200;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    #[error("Watcher is stopped")]
    Stopped,

    #[error("Watcher queue is full")]
    Full,
}

enum Command {
    Register(Consumer),
    Unregister {
        stream_name: String,
        id: String,
    },
    ConsumerCount {
        stream_name: Option<String>,
        reply: oneshot::Sender<usize>,
    },
}

pub struct Watcher {
    records: mpsc::Sender<LogRecord>,
    commands: mpsc::Sender<Command>,
    shutdown: CancellationToken,
    stopped: Arc<AtomicBool>,
}

impl Watcher {
    /// Spawns the event loop on the current Tokio runtime.
    ///
    /// One watcher is meant to serve the whole process; share the returned
    /// handle with every producer and with the tail listener.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start() -> Arc<Self> {
        let (records, record_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (commands, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_event_loop(
            record_rx,
            command_rx,
            shutdown.clone(),
            stopped.clone(),
        ));

        Arc::new(Self {
            records,
            commands,
            shutdown,
            stopped,
        })
    }

    /// Queues a record for fan-out, waiting for channel capacity.
    pub async fn publish(&self, record: LogRecord) -> Result<(), WatcherError> {
        if self.shutdown.is_cancelled() {
            return Err(WatcherError::Stopped);
        }
        self.records
            .send(record)
            .await
            .map_err(|_| WatcherError::Stopped)
    }

    /// Queues a record for fan-out unless the channel is full. Producers that
    /// must never wait on live-tail clients use this.
    pub fn try_publish(&self, record: LogRecord) -> Result<(), WatcherError> {
        if self.shutdown.is_cancelled() {
            return Err(WatcherError::Stopped);
        }
        self.records.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WatcherError::Full,
            mpsc::error::TrySendError::Closed(_) => WatcherError::Stopped,
        })
    }

    pub async fn register(&self, consumer: Consumer) -> Result<(), WatcherError> {
        self.command(Command::Register(consumer)).await
    }

    pub async fn unregister(&self, stream_name: &str, id: &str) -> Result<(), WatcherError> {
        self.command(Command::Unregister {
            stream_name: stream_name.to_string(),
            id: id.to_string(),
        })
        .await
    }

    /// Number of registered consumers, for one stream or for all of them.
    pub async fn consumer_count(&self, stream_name: Option<&str>) -> Result<usize, WatcherError> {
        let (reply, answer) = oneshot::channel();
        self.command(Command::ConsumerCount {
            stream_name: stream_name.map(str::to_string),
            reply,
        })
        .await?;
        answer.await.map_err(|_| WatcherError::Stopped)
    }

    async fn command(&self, command: Command) -> Result<(), WatcherError> {
        if self.shutdown.is_cancelled() {
            return Err(WatcherError::Stopped);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| WatcherError::Stopped)
    }

    /// Asks the event loop to finish and waits briefly for it to do so.
    ///
    /// Returns whether the loop acknowledged in time.
    pub async fn stop(&self) -> bool {
        self.shutdown.cancel();
        for _ in 0..STOP_POLL_ATTEMPTS {
            if self.is_stopped() {
                return true;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        let stopped = self.is_stopped();
        if !stopped {
            warn!("Watcher did not stop in time");
        }
        stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Stream name, then consumer id.
type Registry = HashMap<String, HashMap<String, Consumer>>;

async fn run_event_loop(
    mut records: mpsc::Receiver<LogRecord>,
    mut commands: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
    stopped: Arc<AtomicBool>,
) {
    info!("Watcher started");
    let mut registry = Registry::new();

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            Some(command) = commands.recv() => handle_command(&mut registry, command),
            Some(record) = records.recv() => fan_out(&mut registry, &record).await,
            () = tokio::time::sleep(IDLE_TIMEOUT) => {}
        }
    }

    records.close();
    commands.close();
    for consumers in registry.values_mut() {
        for consumer in consumers.values_mut() {
            consumer.disconnect().await;
        }
    }
    stopped.store(true, Ordering::Release);
    info!("Watcher stopped");
}

fn handle_command(registry: &mut Registry, command: Command) {
    match command {
        Command::Register(consumer) => {
            debug!(
                "Consumer {} registered for stream {}",
                consumer.id(),
                consumer.stream_name()
            );
            let replaced = registry
                .entry(consumer.stream_name().to_string())
                .or_default()
                .insert(consumer.id().to_string(), consumer);
            if let Some(previous) = replaced {
                // Dropping the old connection closes it
                debug!("Consumer {} replaced", previous.id());
            }
        }
        Command::Unregister { stream_name, id } => {
            if let Some(consumers) = registry.get_mut(&stream_name) {
                consumers.remove(&id);
                if consumers.is_empty() {
                    registry.remove(&stream_name);
                }
            }
        }
        Command::ConsumerCount { stream_name, reply } => {
            let count = match stream_name {
                Some(name) => registry.get(&name).map_or(0, HashMap::len),
                None => registry.values().map(HashMap::len).sum(),
            };
            let _ = reply.send(count);
        }
    }
}

async fn fan_out(registry: &mut Registry, record: &LogRecord) {
    let Some(consumers) = registry.get_mut(&record.name) else {
        return;
    };

    let chunk = match encode_chunk(record) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Failed to encode record for stream {}: {}", record.name, e);
            return;
        }
    };

    let mut evicted = Vec::new();
    for (id, consumer) in &mut *consumers {
        if let Err(e) = consumer.deliver(&chunk).await {
            info!(
                "Consumer {} of stream {} disconnected: {}",
                id, record.name, e
            );
            evicted.push(id.clone());
        }
    }

    for id in evicted {
        if let Some(mut consumer) = consumers.remove(&id) {
            consumer.disconnect().await;
        }
    }

    if consumers.is_empty() {
        registry.remove(&record.name);
    }
}
