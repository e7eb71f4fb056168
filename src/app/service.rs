use super::Config;
use super::tail_server::TailServer;
use crate::collector::LinePump;
use crate::domain::ShipperError;
use crate::sender::Writer;
use crate::watcher::Watcher;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Owns the running pipeline: writer, live-tail hub, tail listener and the
/// counter reporter.
pub struct ShipperService {
    writer: Arc<Writer>,
    watcher: Arc<Watcher>,
    tail_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ShipperService {
    pub async fn start(config: &Config) -> Result<Self, ShipperError> {
        let backends = config.backends()?;
        let writer = Arc::new(Writer::new(backends, config.writer_config())?);
        let watcher = Watcher::start();
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();

        let tail_addr = match config.tail_socket_addr()? {
            Some(addr) => {
                let server = TailServer::bind(addr, watcher.clone()).await?;
                let bound = server.local_addr()?;
                tasks.spawn(server.run(shutdown.clone()));
                Some(bound)
            }
            None => None,
        };

        if let Some(interval) = config.stats_interval() {
            tasks.spawn(report_stats(writer.clone(), interval, shutdown.clone()));
        }

        Ok(Self {
            writer,
            watcher,
            tail_addr,
            shutdown,
            tasks,
        })
    }

    /// A pump feeding this service's writer and watcher.
    pub fn pump(&self) -> LinePump {
        LinePump::new(self.writer.clone(), self.watcher.clone())
    }

    pub fn writer(&self) -> &Arc<Writer> {
        &self.writer
    }

    pub fn watcher(&self) -> &Arc<Watcher> {
        &self.watcher
    }

    /// Address the live-tail listener is bound to, if enabled.
    pub fn tail_addr(&self) -> Option<SocketAddr> {
        self.tail_addr
    }

    /// Stops the listener and reporter, flushes the writer, then stops the
    /// watcher.
    pub async fn shutdown(self) -> Result<(), ShipperError> {
        info!("Initiating graceful shutdown...");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        self.writer.close().await;
        let stats = self.writer.stats();
        info!(
            "Counters since last report: {} sent, {} failed, {} dropped",
            stats.sent, stats.failed, stats.dropped
        );

        if !self.watcher.stop().await {
            error!("Watcher did not stop in time");
            return Err(ShipperError::Shutdown(
                "watcher did not acknowledge stop".to_string(),
            ));
        }

        info!("Graceful shutdown completed");
        Ok(())
    }
}

impl std::fmt::Debug for ShipperService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipperService")
            .field("writer", &self.writer)
            .field("tail_addr", &self.tail_addr)
            .finish()
    }
}

async fn report_stats(writer: Arc<Writer>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let stats = writer.take_stats();
                if stats.failed > 0 || stats.dropped > 0 {
                    warn!(
                        "Shipping counters: {} sent, {} failed, {} dropped",
                        stats.sent, stats.failed, stats.dropped
                    );
                } else {
                    info!("Shipping counters: {} sent", stats.sent);
                }
            }
        }
    }
}
