//! Secondary delivery of raw snapshots to an HTTP receiver.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use airmon_common::{HttpConfig, SensorSnapshot};

use crate::error::{Result, TelemetryError};

/// Size of an encoded snapshot.
pub const SNAPSHOT_LEN: usize = 14;

/// Encode a snapshot as the receiver's little-endian record:
/// `u16 pm25, f32 temperature, f32 humidity, f32 pressure`.
pub fn encode_snapshot(snapshot: &SensorSnapshot) -> [u8; SNAPSHOT_LEN] {
    let mut body = [0u8; SNAPSHOT_LEN];
    body[0..2].copy_from_slice(&snapshot.pm25.to_le_bytes());
    body[2..6].copy_from_slice(&snapshot.temperature.to_le_bytes());
    body[6..10].copy_from_slice(&snapshot.humidity.to_le_bytes());
    body[10..14].copy_from_slice(&snapshot.pressure.to_le_bytes());
    body
}

/// Posts every snapshot to the configured receiver. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    /// Build a sink, or `None` when no receiver host is configured.
    pub fn from_config(config: &HttpConfig) -> Result<Option<Self>> {
        if !config.is_enabled() {
            return Ok(None);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("airmon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TelemetryError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Some(Self {
            client,
            url: config.url(),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one snapshot.
    pub async fn send(&self, snapshot: &SensorSnapshot) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(encode_snapshot(snapshot).to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Http(format!(
                "receiver answered {}",
                status
            )));
        }

        tracing::debug!(url = %self.url, "Snapshot delivered over HTTP");
        Ok(())
    }

    /// Send in the background; failures are only logged.
    pub fn spawn_send(&self, snapshot: SensorSnapshot) {
        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.send(&snapshot).await {
                tracing::warn!(url = %sink.url, error = %e, "HTTP delivery failed");
            }
        });
    }
}
