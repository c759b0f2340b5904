//! Sensor acquisition for the IKEA air monitor.
//!
//! Reads PM2.5 from the PM1006 sensor of an IKEA VINDRIKTNING over UART and
//! temperature, humidity and pressure from a Linux IIO environment sensor,
//! and hands the combined snapshots to the telemetry runner.
//!
//! # Sources
//!
//! ```text
//! /dev/ttyS0                                  PM1006 frames, 9600 8N1
//! /sys/bus/iio/devices/iio:device0/in_*_input temperature, humidity, pressure
//! ```

pub mod collector;
pub mod environment;
pub mod error;
pub mod pm1006;

pub use collector::{Calibration, SensorCollector};
pub use error::SensorError;
