//! Result categorization and formatting shared by the TUI and headless output.

use crate::speedtest::SpeedTestResult;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    UltraFast,
    Fast,
    Excellent,
    Good,
    Fair,
    Basic,
    Poor,
}

impl Rating {
    pub fn for_ping(ms: f64) -> Self {
        if ms < 50.0 {
            Rating::Excellent
        } else if ms < 100.0 {
            Rating::Good
        } else if ms < 200.0 {
            Rating::Fair
        } else {
            Rating::Poor
        }
    }

    pub fn for_download(mbps: f64) -> Self {
        if mbps > 100.0 {
            Rating::UltraFast
        } else if mbps > 50.0 {
            Rating::Fast
        } else if mbps > 25.0 {
            Rating::Good
        } else {
            Rating::Basic
        }
    }

    pub fn for_upload(mbps: f64) -> Self {
        if mbps > 50.0 {
            Rating::Excellent
        } else if mbps > 25.0 {
            Rating::Good
        } else if mbps > 10.0 {
            Rating::Fair
        } else {
            Rating::Basic
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rating::UltraFast => "Ultra fast",
            Rating::Fast => "Fast",
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Fair => "Fair",
            Rating::Basic => "Basic",
            Rating::Poor => "Poor",
        };
        f.write_str(label)
    }
}

pub fn format_speed(mbps: Option<f64>) -> String {
    match mbps {
        None => "--".to_string(),
        Some(mbps) if mbps >= 1000.0 => format!("{:.2} Gbps", mbps / 1000.0),
        Some(mbps) => format!("{mbps:.2} Mbps"),
    }
}

pub fn format_ping(ms: Option<f64>) -> String {
    match ms {
        None => "--".to_string(),
        Some(ms) => format!("{ms:.1} ms"),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    pub value: f64,
    pub rating: Rating,
}

/// Serializable summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub complete: bool,
    pub ping_ms: Option<Metric>,
    pub download_mbps: Option<Metric>,
    pub upload_mbps: Option<Metric>,
}

impl Report {
    pub fn new(results: &SpeedTestResult) -> Self {
        let metric = |value: Option<f64>, rate: fn(f64) -> Rating| {
            value.map(|value| Metric {
                value,
                rating: rate(value),
            })
        };

        Self {
            complete: results.ping_ms.is_some()
                && results.download_mbps.is_some()
                && results.upload_mbps.is_some(),
            ping_ms: metric(results.ping_ms, Rating::for_ping),
            download_mbps: metric(results.download_mbps, Rating::for_download),
            upload_mbps: metric(results.upload_mbps, Rating::for_upload),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rating = |metric: &Option<Metric>| {
            metric
                .as_ref()
                .map(|m| format!("  ({})", m.rating))
                .unwrap_or_default()
        };

        writeln!(
            f,
            "Ping      {}{}",
            format_ping(self.ping_ms.as_ref().map(|m| m.value)),
            rating(&self.ping_ms)
        )?;
        writeln!(
            f,
            "Download  {}{}",
            format_speed(self.download_mbps.as_ref().map(|m| m.value)),
            rating(&self.download_mbps)
        )?;
        write!(
            f,
            "Upload    {}{}",
            format_speed(self.upload_mbps.as_ref().map(|m| m.value)),
            rating(&self.upload_mbps)
        )
    }
}
