use super::{
    download::DownloadTest, ping::PingTest, upload::UploadTest, SpeedTestResult, Stage, StageError,
    TestPhase,
};
use crate::settings::Settings;
use reqwest::Client;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const MAX_PING_SAMPLES: usize = 100;

/// Everything the presentation layer reads about a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementState {
    pub phase: TestPhase,
    pub progress_percent: f64,
    pub results: SpeedTestResult,
    pub ping_samples: Vec<f64>,
    pub download_samples: Vec<f64>,
}

impl MeasurementState {
    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.phase.stage()
    }
}

/// Sequences ping, download and upload, and owns the measurement state.
///
/// Cloning yields another handle to the same state. Every run carries a
/// generation; `start` and `reset` move the generation forward, which
/// drops the older run's in-flight request and discards its writes.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    settings: Mutex<Settings>,
    state: watch::Sender<MeasurementState>,
    generation: watch::Sender<u64>,
}

impl Inner {
    /// Only called with the state lock held, so no write can slip between
    /// the bump and the state change that goes with it.
    fn next_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        next
    }
}

impl Controller {
    pub fn new(settings: Settings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let (state, _) = watch::channel(MeasurementState::default());
        let (generation, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                settings: Mutex::new(settings),
                state,
                generation,
            }),
        })
    }

    pub fn settings(&self) -> Settings {
        self.inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Takes effect from the next `start`.
    pub fn set_settings(&self, settings: Settings) {
        *self
            .inner
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn snapshot(&self) -> MeasurementState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MeasurementState> {
        self.inner.state.subscribe()
    }

    /// Clears the state and cancels the run in progress, if any.
    pub fn reset(&self) {
        self.inner.state.send_modify(|state| {
            self.inner.next_generation();
            *state = MeasurementState::default();
        });
        debug!("measurement state reset");
    }

    /// Runs a full ping, download, upload sequence and returns the state it
    /// ended in.
    ///
    /// Stage failures are logged, not returned: the run stops with
    /// `is_running() == false` and whatever results it had gathered.
    pub async fn start(&self) -> MeasurementState {
        let settings = self.settings();

        let mut generation = 0;
        self.inner.state.send_modify(|state| {
            generation = self.inner.next_generation();
            *state = MeasurementState {
                phase: TestPhase::Ping,
                ..MeasurementState::default()
            };
        });
        info!(generation, server = %settings.endpoints.ping, "speed test started");

        let run = Run {
            inner: &self.inner,
            generation,
        };

        match run.execute(&settings).await {
            Ok(()) => {
                let results = self.snapshot().results;
                info!(
                    ping_ms = ?results.ping_ms,
                    download_mbps = ?results.download_mbps,
                    upload_mbps = ?results.upload_mbps,
                    "speed test complete"
                );
            }
            Err(StageError::Superseded) => {
                debug!(generation, "run superseded, discarding its results");
            }
            Err(err) => {
                let stage = self.inner.state.borrow().current_stage();
                error!(?stage, error = %err, "speed test stopped early");
                let _ = run.update(|state| state.phase = TestPhase::Idle);
            }
        }

        self.snapshot()
    }
}

struct Run<'a> {
    inner: &'a Inner,
    generation: u64,
}

impl Run<'_> {
    /// Applies `f` if this run is still current.
    fn update(&self, f: impl FnOnce(&mut MeasurementState)) -> Result<(), StageError> {
        let mut current = false;
        self.inner.state.send_if_modified(|state| {
            if *self.inner.generation.borrow() != self.generation {
                return false;
            }
            current = true;
            f(state);
            true
        });

        if current {
            Ok(())
        } else {
            Err(StageError::Superseded)
        }
    }

    /// Moves to `phase` with a cleared progress bar, after `f` records the
    /// previous stage's result.
    fn advance(
        &self,
        phase: TestPhase,
        f: impl FnOnce(&mut MeasurementState),
    ) -> Result<(), StageError> {
        self.update(|state| {
            f(state);
            state.phase = phase;
            state.progress_percent = 0.0;
        })
    }

    /// Resolves once another `start` or `reset` has replaced this run.
    async fn superseded(&self) {
        let mut rx = self.inner.generation.subscribe();
        if rx.wait_for(|current| *current != self.generation).await.is_err() {
            // The sender lives as long as `inner`, so this never happens.
            std::future::pending::<()>().await;
        }
    }

    /// Drives `stage` until it finishes, times out, or the run is replaced.
    /// A replaced run drops the stage future, and with it any request in
    /// flight.
    async fn guard<T, F>(&self, limit: Option<Duration>, stage: F) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        let stage = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, stage)
                    .await
                    .unwrap_or_else(|_| Err(StageError::Timeout(limit))),
                None => stage.await,
            }
        };

        tokio::select! {
            result = stage => result,
            () = self.superseded() => Err(StageError::Superseded),
        }
    }

    async fn execute(&self, settings: &Settings) -> Result<(), StageError> {
        let client = &self.inner.client;

        let mut ping = PingTest::new(
            settings.endpoints.ping.clone(),
            settings.ping_count,
            settings.ping_interval,
            settings.timeouts.ping_probe,
        );
        let ping = self
            .guard(
                None,
                ping.run(client, |progress| {
                    self.update(|state| {
                        state.ping_samples.push(progress.latest_ping);
                        if state.ping_samples.len() > MAX_PING_SAMPLES {
                            state.ping_samples.remove(0);
                        }
                    })
                }),
            )
            .await?;
        if ping.median_ms.is_none() {
            warn!(failures = ping.failures, "every ping probe failed, latency unavailable");
        }

        self.advance(TestPhase::Download, |state| {
            state.results.ping_ms = ping.median_ms;
        })?;

        let mut download =
            DownloadTest::new(settings.endpoints.download.clone(), settings.download_size_bytes());
        let download = self
            .guard(
                Some(settings.timeouts.download),
                download.run(client, |progress| {
                    let percent = progress.percent();
                    self.update(move |state| {
                        state.progress_percent = percent;
                        state.download_samples = progress.speed_samples;
                    })
                }),
            )
            .await?;

        self.advance(TestPhase::Upload, |state| {
            state.results.download_mbps = Some(download.avg_speed_mbps);
        })?;

        let upload = UploadTest::new(settings.endpoints.upload.clone(), settings.upload_size_bytes());
        let upload = self
            .guard(Some(settings.timeouts.upload), upload.run(client))
            .await?;

        self.update(|state| {
            state.results.upload_mbps = Some(upload.avg_speed_mbps);
            state.phase = TestPhase::Complete;
            state.progress_percent = 100.0;
        })
    }
}
