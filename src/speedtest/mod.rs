pub mod controller;
pub mod download;
pub mod ping;
pub mod upload;

pub use controller::{Controller, MeasurementState};

use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeedTestResult {
    pub ping_ms: Option<f64>,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
}

impl SpeedTestResult {
    pub fn is_empty(&self) -> bool {
        self.ping_ms.is_none() && self.download_mbps.is_none() && self.upload_mbps.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ping,
    Download,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestPhase {
    #[default]
    Idle,
    Ping,
    Download,
    Upload,
    Complete,
}

impl TestPhase {
    pub fn stage(self) -> Option<Stage> {
        match self {
            TestPhase::Ping => Some(Stage::Ping),
            TestPhase::Download => Some(Stage::Download),
            TestPhase::Upload => Some(Stage::Upload),
            TestPhase::Idle | TestPhase::Complete => None,
        }
    }

    pub fn is_running(self) -> bool {
        self.stage().is_some()
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with {0}")]
    Status(StatusCode),
    #[error("response carried no readable body")]
    EmptyBody,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("run was superseded")]
    Superseded,
}

/// Megabits per second for `bytes` moved in `elapsed`.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    (bytes as f64 * 8.0) / elapsed.as_secs_f64() / 1_000_000.0
}

/// Element at index `len / 2` of the ascending-sorted samples.
pub fn median(samples: &[f64]) -> Option<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.get(sorted.len() / 2).copied()
}
