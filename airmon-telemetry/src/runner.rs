//! Driver loop for the monitor.

use std::time::Duration;

use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};

use airmon_common::{AirmonConfig, LoggingConfig, Reading, SensorSnapshot, init_tracing};

use crate::MonitorArgs;
use crate::error::Result;
use crate::http::HttpSink;
use crate::link::{BrokerLink, NetworkTransport};
use crate::mqtt::RumqttLink;
use crate::network::SystemNetwork;
use crate::telemetry::{Telemetry, TelemetrySettings};

/// Something that produces sensor snapshots on demand.
#[allow(async_fn_in_trait)]
pub trait SnapshotSource {
    /// Take one sample, or `None` if no valid reading is available yet.
    async fn sample(&mut self) -> Option<SensorSnapshot>;
}

/// Runs the telemetry core until Ctrl+C.
///
/// Handles:
/// - Ticking the core at a fixed period
/// - Sampling the sensors and publishing readings
/// - Forwarding snapshots to the HTTP receiver (optional)
/// - Publishing "offline" and disconnecting on shutdown
pub struct TelemetryRunner<L, N, S> {
    telemetry: Telemetry<L, N>,
    source: S,
    http: Option<HttpSink>,
    tick_interval: Duration,
    sample_interval: Duration,
}

impl<L, N, S> TelemetryRunner<L, N, S>
where
    L: BrokerLink,
    N: NetworkTransport,
    S: SnapshotSource,
{
    pub fn new(
        telemetry: Telemetry<L, N>,
        source: S,
        tick_interval: Duration,
        sample_interval: Duration,
    ) -> Self {
        Self {
            telemetry,
            source,
            http: None,
            tick_interval,
            sample_interval,
        }
    }

    /// Also deliver every snapshot to an HTTP receiver.
    pub fn with_http_sink(mut self, sink: HttpSink) -> Self {
        self.http = Some(sink);
        self
    }

    pub fn telemetry(&self) -> &Telemetry<L, N> {
        &self.telemetry
    }

    /// Take one sample and hand it to the core and the HTTP sink.
    pub async fn sample_once(&mut self) -> Option<Reading> {
        let snapshot = self.source.sample().await?;
        let reading = Reading::from_snapshot(snapshot);

        tracing::debug!(
            pm25 = snapshot.pm25,
            temperature = snapshot.temperature,
            humidity = snapshot.humidity,
            aqi = reading.metrics.aqi,
            "Sampled sensors"
        );

        self.telemetry.publish(reading).await;
        if let Some(sink) = &self.http {
            sink.spawn_send(snapshot);
        }

        Some(reading)
    }

    /// Run until Ctrl+C is received.
    pub async fn run(mut self) -> Result<()> {
        let mut tick = interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sample = interval(self.sample_interval);
        sample.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        tracing::info!(
            tick = ?self.tick_interval,
            sample = ?self.sample_interval,
            "Monitor running. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.telemetry.tick().await;
                }
                _ = sample.tick() => {
                    if self.sample_once().await.is_none() {
                        tracing::debug!("No valid sample available");
                    }
                }
                result = &mut shutdown => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    }
                    break;
                }
            }
        }

        tracing::info!("Received shutdown signal");
        self.telemetry.shutdown().await;
        tracing::info!("Goodbye!");

        Ok(())
    }
}

/// Load the configuration and logging from the command line, then run the
/// monitor with the real broker link and network.
///
/// `make_source` builds the sensor source once configuration is loaded.
pub async fn run_monitor<S, F>(default_config: &'static str, make_source: F) -> anyhow::Result<()>
where
    S: SnapshotSource,
    F: FnOnce(&AirmonConfig) -> anyhow::Result<S>,
{
    let args = MonitorArgs::parse_with_default(default_config);
    let config = AirmonConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let log_config = match &args.log_level {
        Some(level) => LoggingConfig {
            level: level.clone(),
            format: config.logging.format,
        },
        None => config.logging.clone(),
    };
    init_tracing(&log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting airmon");
    if !config.mqtt.is_enabled() {
        tracing::warn!("No MQTT broker configured, telemetry stays local");
    }

    let source = make_source(&config)?;
    let runner = build_runner(&config, source).map_err(|e| anyhow::anyhow!("{}", e))?;

    runner.run().await.map_err(|e| anyhow::anyhow!("{}", e))
}

fn build_runner<S: SnapshotSource>(
    config: &AirmonConfig,
    source: S,
) -> Result<TelemetryRunner<RumqttLink, SystemNetwork, S>> {
    let telemetry = Telemetry::new(
        TelemetrySettings::from_config(config),
        RumqttLink::new(),
        SystemNetwork::new(&config.device.interface),
    );

    let mut runner = TelemetryRunner::new(
        telemetry,
        source,
        config.timing.tick_interval(),
        config.timing.sample_interval(),
    );

    if let Some(sink) = HttpSink::from_config(&config.http)? {
        tracing::info!(url = %sink.url(), "HTTP delivery enabled");
        runner = runner.with_http_sink(sink);
    }

    Ok(runner)
}
