//! IKEA air monitor daemon.
//!
//! Samples the particulate and environment sensors and publishes readings to
//! an MQTT broker with Home Assistant discovery.

use anyhow::Result;

use airmon_bridge::SensorCollector;
use airmon_telemetry::run_monitor;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    run_monitor("airmon.json5", |config| {
        Ok(SensorCollector::open(&config.sensors)?)
    })
    .await
}
