//! Measures latency, download and upload throughput against a speed test server.
//!
//! [`speedtest::Controller`] runs the stages in order and publishes a
//! [`speedtest::MeasurementState`] that front ends observe.

pub mod report;
pub mod settings;
pub mod speedtest;
