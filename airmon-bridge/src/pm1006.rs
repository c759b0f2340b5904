//! PM1006 particulate sensor (IKEA VINDRIKTNING) over UART.
//!
//! The sensor streams 20-byte frames:
//!
//! ```text
//!  0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15 16 17 18 19
//! 16 11 0b 00 00 00 0c 00 00 03 cb 00 00 00 0c 01 00 00 00 e7
//!                |pm2_5|     |pm1_0|     |pm10 |        |sum|
//! ```
//!
//! A frame is valid when it starts with `0x16` and all 20 bytes sum to zero
//! modulo 256.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};

use crate::error::SensorError;

/// Length of one frame.
pub const FRAME_LEN: usize = 20;

/// First byte of every frame.
pub const START_BYTE: u8 = 0x16;

/// Validate a frame and extract its PM2.5 value in µg/m³.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Result<u16, SensorError> {
    if frame[0] != START_BYTE {
        return Err(SensorError::Frame(format!(
            "bad start byte 0x{:02x}",
            frame[0]
        )));
    }

    let sum = frame.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    if sum != 0 {
        return Err(SensorError::Frame(format!("checksum off by 0x{:02x}", sum)));
    }

    Ok(u16::from_be_bytes([frame[5], frame[6]]))
}

/// Reassembles frames from an arbitrarily chunked byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    rejected: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dropped for a bad checksum since creation.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Append bytes and return the PM2.5 value of the last valid frame they
    /// completed, if any.
    pub fn feed(&mut self, bytes: &[u8]) -> Option<u16> {
        self.buffer.extend_from_slice(bytes);
        let mut latest = None;

        loop {
            // Resynchronize on the start byte
            match self.buffer.iter().position(|&b| b == START_BYTE) {
                Some(start) => {
                    self.buffer.drain(..start);
                }
                None => {
                    self.buffer.clear();
                    break;
                }
            }

            let Some(frame) = self.buffer.first_chunk::<FRAME_LEN>() else {
                break;
            };

            match decode_frame(frame) {
                Ok(pm25) => {
                    latest = Some(pm25);
                    self.buffer.drain(..FRAME_LEN);
                }
                Err(e) => {
                    self.rejected += 1;
                    tracing::debug!(error = %e, "Discarding PM1006 frame");
                    // Skip this start byte and look for the next one
                    self.buffer.drain(..1);
                }
            }
        }

        latest
    }
}

/// Open the sensor's serial port and decode frames in a background task.
///
/// The receiver holds the latest PM2.5 value, `None` until the first valid frame.
pub fn spawn_reader(port: &str, baud_rate: u32) -> Result<watch::Receiver<Option<u16>>, SensorError> {
    let builder = tokio_serial::new(port, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One);
    let serial = SerialStream::open(&builder)?;

    tracing::info!(port, baud_rate, "PM1006 serial port opened");

    let (tx, rx) = watch::channel(None);
    tokio::spawn(read_frames(serial, tx));
    Ok(rx)
}

/// Feed a byte stream into a decoder until it ends, publishing each value.
pub(crate) async fn read_frames<R>(mut reader: R, tx: watch::Sender<Option<u16>>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; 64];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::warn!("PM1006 serial stream closed");
                break;
            }
            Ok(n) => {
                if let Some(pm25) = decoder.feed(&chunk[..n]) {
                    tracing::trace!(pm25, "PM1006 frame");
                    tx.send_replace(Some(pm25));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "PM1006 serial read failed");
                break;
            }
        }
    }
}
