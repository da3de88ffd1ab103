//! Latency Sentinel - streaming response-time anomaly detector
//!
//! Consumes response-time measurements from a message bus, scores each one
//! with a windowed z-score or EMA detector and publishes a verdict per
//! measurement.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sentinel_lib::{
    bus::{InMemoryBus, MessageBus, StdioBus, ANOMALIES_CHANNEL, MEASUREMENTS_CHANNEL},
    generator::ResponseTimeGenerator,
    health::{components, HealthRegistry},
    observability::{SentinelMetrics, StructuredLogger},
    DetectorKind, Environment, PipelineBuilder, PipelineStats, SentinelResult,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

use config::SentinelConfig;

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Streaming latency anomaly detector
#[derive(Parser)]
#[command(name = "latency-sentinel")]
#[command(author, version, about = "Streaming latency anomaly detector", long_about = None)]
struct Cli {
    /// Configuration file (settings can also be set via SENTINEL_* env vars)
    #[arg(long, short, env = "SENTINEL_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Port for the health/metrics API
    #[arg(long)]
    api_port: Option<u16>,

    /// Do not serve the health/metrics API
    #[arg(long)]
    no_api: bool,

    /// Log output format
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic stream and detect anomalies in-process
    ///
    /// Verdicts are written to stdout as JSON lines.
    Run {
        /// Detector to use (sma or ema)
        #[arg(default_value = "sma")]
        detector: DetectorKind,
    },

    /// Detect anomalies in JSON lines read from stdin
    Detect {
        /// Detector to use (sma or ema)
        #[arg(default_value = "sma")]
        detector: DetectorKind,
    },

    /// Write synthetic measurements to stdout as JSON lines
    Generate {
        /// Stop after this many measurements
        #[arg(long)]
        count: Option<u64>,

        /// Delay between measurements in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Seed for a reproducible stream
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    /// Human readable (default)
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Shared state for one sentinel process
struct Sentinel {
    config: SentinelConfig,
    health: HealthRegistry,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
    shutdown: broadcast::Sender<()>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SentinelConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.api_port {
        config.api_port = port;
    }
    if cli.no_api {
        config.api_enabled = false;
    }

    init_tracing(cli.log_format, config.environment);

    let (shutdown, _) = broadcast::channel(1);
    let sentinel = Sentinel {
        logger: StructuredLogger::new(&config.instance_name),
        health: HealthRegistry::new(),
        metrics: SentinelMetrics::new(),
        shutdown,
        config,
    };
    sentinel.spawn_signal_handler();

    match cli.command {
        Commands::Run { detector } => sentinel.run(detector).await,
        Commands::Detect { detector } => sentinel.detect(detector).await,
        Commands::Generate {
            count,
            interval_ms,
            seed,
        } => sentinel.generate(count, interval_ms, seed).await,
    }
}

/// Logs go to stderr so stdout stays a clean JSON-lines stream
fn init_tracing(format: LogFormat, environment: Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(environment.default_log_level()));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

impl Sentinel {
    fn spawn_signal_handler(&self) {
        let shutdown = self.shutdown.clone();
        let logger = self.logger.clone();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    logger.log_shutdown("SIGINT received");
                    let _ = shutdown.send(());
                }
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });
    }

    fn spawn_api(&self) {
        if !self.config.api_enabled {
            return;
        }

        let state = Arc::new(api::AppState::new(
            self.health.clone(),
            self.metrics.clone(),
        ));
        let port = self.config.api_port;

        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(error = %e, port, "API server failed");
            }
        });
    }

    /// Build the detector and announce it
    fn start(&self, mode: &str, kind: DetectorKind) -> Result<sentinel_lib::Detector> {
        let detector_config = self.config.detector_config(kind);
        let detector = detector_config
            .build()
            .with_context(|| format!("Invalid {} detector configuration", kind))?;

        let params = detector_config.describe();
        self.metrics.set_detector(kind.as_str(), &params);
        self.logger
            .log_startup(SENTINEL_VERSION, mode, kind.as_str(), &params);

        Ok(detector)
    }

    async fn finish_pipeline(
        &self,
        outcome: SentinelResult<PipelineStats>,
    ) -> Result<PipelineStats> {
        self.health.record_pipeline_outcome(&outcome).await;
        self.health.set_ready(false).await;

        match outcome {
            Ok(stats) => {
                self.logger.log_pipeline_stopped(&stats);
                Ok(stats)
            }
            Err(e) => {
                self.logger.log_pipeline_failed(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Generator, pipeline and verdict printer over the in-process bus
    async fn run(&self, kind: DetectorKind) -> Result<()> {
        let detector = self.start("run", kind)?;

        let memory_bus = Arc::new(InMemoryBus::with_capacity(self.config.bus_capacity));
        let bus: Arc<dyn MessageBus> = memory_bus.clone();

        self.health.register(components::BUS).await;
        self.health.register(components::PIPELINE).await;
        self.health.register(components::GENERATOR).await;
        self.spawn_api();

        // Subscribe before the generator starts so no measurement is missed
        let measurements = bus.subscribe(MEASUREMENTS_CHANNEL).await?;
        let verdicts = bus.subscribe(ANOMALIES_CHANNEL).await?;

        let pipeline = PipelineBuilder::new()
            .bus(bus.clone())
            .metrics(self.metrics.clone())
            .build()?;
        let pipeline_handle = tokio::spawn(pipeline.run_stream(
            detector,
            measurements,
            self.shutdown.subscribe(),
        ));

        let printer_handle = tokio::spawn(print_verdicts(verdicts, self.shutdown.subscribe()));

        let generator = ResponseTimeGenerator::new(self.config.generator_config(None, None, None))
            .with_metrics(self.metrics.clone());
        let generator_handle = tokio::spawn(generator.run(bus.clone(), self.shutdown.subscribe()));

        self.health.set_ready(true).await;
        info!(
            api_enabled = self.config.api_enabled,
            api_port = self.config.api_port,
            "Sentinel running, press Ctrl-C to stop"
        );

        let outcome = pipeline_handle.await.context("Pipeline task panicked")?;

        // The pipeline may have stopped on its own; bring the rest down with it
        let _ = self.shutdown.send(());

        // The generator may be mid-publish, so the bus stays open until it returns
        let generated = generator_handle.await.context("Generator task panicked")?;
        match &generated {
            Ok(published) => info!(published, "Generator stopped"),
            Err(e) => error!(error = %e, "Generator failed"),
        }
        self.health.record_generator_outcome(&generated).await;
        memory_bus.shutdown();

        if let Err(e) = printer_handle.await.context("Printer task panicked")? {
            error!(error = %e, "Failed to write verdicts to stdout");
        }

        self.finish_pipeline(outcome).await?;
        Ok(())
    }

    /// Pipeline over stdin/stdout
    async fn detect(&self, kind: DetectorKind) -> Result<()> {
        let detector = self.start("detect", kind)?;

        let bus: Arc<dyn MessageBus> = Arc::new(StdioBus::stdio());
        self.health.register(components::BUS).await;
        self.health.register(components::PIPELINE).await;
        self.spawn_api();

        let pipeline = PipelineBuilder::new()
            .bus(bus)
            .metrics(self.metrics.clone())
            .build()?;

        self.health.set_ready(true).await;
        let outcome = pipeline.run(detector, self.shutdown.subscribe()).await;

        self.finish_pipeline(outcome).await?;
        Ok(())
    }

    /// Generator writing to stdout
    async fn generate(
        &self,
        count: Option<u64>,
        interval_ms: Option<u64>,
        seed: Option<u64>,
    ) -> Result<()> {
        let generator_config = self.config.generator_config(count, interval_ms, seed);
        info!(
            version = SENTINEL_VERSION,
            limit = ?generator_config.limit,
            seed = ?generator_config.seed,
            "Starting measurement generator"
        );

        let bus: Arc<dyn MessageBus> = Arc::new(StdioBus::stdout());
        let published = ResponseTimeGenerator::new(generator_config)
            .with_metrics(self.metrics.clone())
            .run(bus, self.shutdown.subscribe())
            .await?;

        info!(published, "Generator finished");
        Ok(())
    }
}

/// Copy verdicts from the in-process bus to stdout
async fn print_verdicts(
    mut verdicts: sentinel_lib::bus::MessageStream,
    mut shutdown: broadcast::Receiver<()>,
) -> SentinelResult<()> {
    let stdout = StdioBus::stdout();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            next = verdicts.next() => {
                match next {
                    Some(Ok(payload)) => {
                        stdout.publish(ANOMALIES_CHANNEL, payload).await?;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Verdict stream interrupted");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}
