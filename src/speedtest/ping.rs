use super::{median, StageError};
use reqwest::{header, Client, Url};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct PingTest {
    url: Url,
    samples: Vec<f64>,
    ping_count: usize,
    interval: Duration,
    probe_timeout: Duration,
}

impl PingTest {
    pub fn new(url: Url, ping_count: usize, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            url,
            samples: Vec::new(),
            ping_count,
            interval,
            probe_timeout,
        }
    }

    /// Runs every probe, calling `on_sample` after each successful one.
    ///
    /// Failed probes are skipped. Only an error returned by `on_sample`
    /// stops the sequence early.
    pub async fn run<F>(&mut self, client: &Client, mut on_sample: F) -> Result<PingResult, StageError>
    where
        F: FnMut(PingProgress) -> Result<(), StageError>,
    {
        self.samples.clear();
        let mut failures = 0;

        for i in 0..self.ping_count {
            match self.probe(client).await {
                Ok(elapsed_ms) => {
                    debug!(probe = i, elapsed_ms, "ping sample");
                    self.samples.push(elapsed_ms);
                    on_sample(PingProgress {
                        latest_ping: elapsed_ms,
                        completed: i + 1,
                        total: self.ping_count,
                    })?;
                }
                Err(err) => {
                    warn!(probe = i, error = %err, "ping probe failed");
                    failures += 1;
                }
            }

            if i + 1 < self.ping_count {
                tokio::time::sleep(self.interval).await;
            }
        }

        Ok(PingResult {
            median_ms: median(&self.samples),
            samples: self.samples.clone(),
            failures,
        })
    }

    async fn probe(&self, client: &Client) -> Result<f64, StageError> {
        let start = Instant::now();
        let request = client
            .get(self.url.clone())
            .header(header::CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.probe_timeout, request)
            .await
            .map_err(|_| StageError::Timeout(self.probe_timeout))??;

        if !response.status().is_success() {
            return Err(StageError::Status(response.status()));
        }

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

#[derive(Debug, Clone)]
pub struct PingProgress {
    pub latest_ping: f64,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct PingResult {
    /// `None` when every probe failed.
    pub median_ms: Option<f64>,
    pub samples: Vec<f64>,
    pub failures: usize,
}
