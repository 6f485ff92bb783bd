use super::{throughput_mbps, StageError};
use futures::StreamExt;
use reqwest::{header, Client, Url};
use std::time::{Duration, Instant};
use tracing::debug;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
const MAX_SAMPLES: usize = 200;

pub struct DownloadTest {
    url: Url,
    speed_samples: Vec<f64>,
    expected_size: u64,
}

impl DownloadTest {
    pub fn new(url: Url, expected_size: u64) -> Self {
        Self {
            url,
            speed_samples: Vec::new(),
            expected_size,
        }
    }

    /// Streams the payload, calling `on_progress` once per received chunk.
    ///
    /// A successful response whose body yields no bytes fails with
    /// [`StageError::EmptyBody`] instead of reporting 0 Mbps.
    pub async fn run<F>(&mut self, client: &Client, mut on_progress: F) -> Result<DownloadResult, StageError>
    where
        F: FnMut(DownloadProgress) -> Result<(), StageError>,
    {
        let start = Instant::now();

        let response = client
            .get(self.url.clone())
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::Status(response.status()));
        }

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_update = Instant::now();
        let mut last_downloaded: u64 = 0;

        self.speed_samples.clear();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            let interval = now.duration_since(last_update);

            if interval >= SAMPLE_INTERVAL {
                self.speed_samples
                    .push(throughput_mbps(downloaded - last_downloaded, interval));

                if self.speed_samples.len() > MAX_SAMPLES {
                    self.speed_samples.remove(0);
                }

                last_update = now;
                last_downloaded = downloaded;
            }

            on_progress(DownloadProgress {
                downloaded_bytes: downloaded,
                total_bytes: self.expected_size,
                speed_samples: self.speed_samples.clone(),
            })?;
        }

        if downloaded == 0 {
            return Err(StageError::EmptyBody);
        }

        let elapsed = start.elapsed();
        let avg_speed_mbps = throughput_mbps(downloaded, elapsed);
        debug!(bytes = downloaded, ?elapsed, avg_speed_mbps, "download finished");

        Ok(DownloadResult {
            bytes: downloaded,
            elapsed,
            avg_speed_mbps,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed_samples: Vec<f64>,
}

impl DownloadProgress {
    /// Share of the expected payload received so far, capped at 100.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub bytes: u64,
    pub elapsed: Duration,
    pub avg_speed_mbps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(downloaded_bytes: u64, total_bytes: u64) -> DownloadProgress {
        DownloadProgress {
            downloaded_bytes,
            total_bytes,
            speed_samples: Vec::new(),
        }
    }

    #[test]
    fn percent_tracks_received_share() {
        assert_eq!(progress(0, 1000).percent(), 0.0);
        assert_eq!(progress(250, 1000).percent(), 25.0);
        assert_eq!(progress(1000, 1000).percent(), 100.0);
    }

    #[test]
    fn percent_is_clamped_when_server_sends_more() {
        assert_eq!(progress(1500, 1000).percent(), 100.0);
    }

    #[test]
    fn percent_never_decreases_as_bytes_accumulate() {
        let mut last = 0.0;
        for received in (0..=12_000_000u64).step_by(65_536) {
            let pct = progress(received, 10_485_760).percent();
            assert!(pct >= last);
            assert!(pct <= 100.0);
            last = pct;
        }
    }
}
