pub mod config;
pub mod logging_system;
pub mod service;
pub mod shutdown;
pub mod tail_server;

pub use config::{Config, ConfigError, LogLevel};
pub use logging_system::{LoggingError, setup_logging};
pub use service::ShipperService;
pub use shutdown::{ShutdownSignal, wait_for_signal};
pub use tail_server::TailServer;

use crate::collector::{PumpSummary, StreamSource};
use crate::domain::ShipperError;
use std::future::Future;
use std::io;
use std::process;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Name, entrypoint and ident of the stream carrying the agent's own stdin.
pub const AGENT_STREAM: &str = "agent";

pub struct App {
    config: Config,
    service: ShipperService,
}

impl App {
    pub async fn from_args<I, T>(args: I) -> Result<Self, ShipperError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Result<Self, ShipperError> {
        setup_logging(config.log_level)?;

        info!("Starting rask-log-shipper v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "Configuration: forwards={:?}, connections={}, buffer_size={}, rate_limit={}, tail_addr={:?}",
            config.forwards,
            config.connections,
            config.buffer_size,
            config.rate_limit,
            config.tail_addr
        );

        let service = ShipperService::start(&config).await?;
        Ok(Self { config, service })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &ShipperService {
        &self.service
    }

    /// Pumps stdin until EOF or a shutdown signal, then shuts down.
    pub async fn run(self) -> Result<(), ShipperError> {
        let source = StreamSource::new(process::id().to_string(), AGENT_STREAM, "stdout")
            .with_entrypoint(AGENT_STREAM)
            .with_ident(AGENT_STREAM);
        let stdin_pump = self.service.pump().spawn(source, tokio::io::stdin());

        info!("rask-log-shipper is running. Press Ctrl+C to stop.");

        wait_for_stop(wait_for_signal(), stdin_pump).await;

        self.service.shutdown().await?;
        info!("rask-log-shipper stopped.");
        Ok(())
    }
}

/// Returns on the first shutdown signal or when the pump ends. Without
/// signal handling only the pump ending stops the app.
async fn wait_for_stop<S>(signal: S, mut pump: JoinHandle<PumpSummary>)
where
    S: Future<Output = io::Result<ShutdownSignal>>,
{
    tokio::select! {
        received = signal => match received {
            Ok(_) => {}
            Err(e) => {
                warn!("Signal handling unavailable, running until stdin closes: {}", e);
                log_pump_outcome(pump.await);
            }
        },
        pumped = &mut pump => log_pump_outcome(pumped),
    }
}

fn log_pump_outcome(pumped: Result<PumpSummary, tokio::task::JoinError>) {
    match pumped {
        Ok(summary) => info!("stdin closed after {} lines", summary.lines),
        Err(e) => error!("stdin pump failed: {}", e),
    }
}

// Main entry point for the application
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = match App::from_args(std::env::args_os()).await {
        Ok(app) => app,
        Err(ShipperError::Config(ConfigError::ArgumentError(e))) => e.exit(),
        Err(e) => {
            eprintln!("Failed to start rask-log-shipper: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("Application error: {}", e);
        process::exit(1);
    }

    // A blocking stdin read would otherwise hold the runtime open
    process::exit(0)
}
