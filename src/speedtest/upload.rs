use super::{throughput_mbps, StageError};
use reqwest::{header, Client, Url};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct UploadTest {
    url: Url,
    upload_size: usize,
}

impl UploadTest {
    pub fn new(url: Url, upload_size: usize) -> Self {
        Self { url, upload_size }
    }

    pub async fn run(&self, client: &Client) -> Result<UploadResult, StageError> {
        let start = Instant::now();
        let data = payload(self.upload_size);

        let response = client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(data)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::Status(response.status()));
        }

        let elapsed = start.elapsed();
        let avg_speed_mbps = throughput_mbps(self.upload_size as u64, elapsed);

        match response.json::<UploadAck>().await {
            Ok(ack) if ack.bytes_received != self.upload_size as u64 => {
                warn!(
                    sent = self.upload_size,
                    acknowledged = ack.bytes_received,
                    "server acknowledged a different upload size"
                );
            }
            Ok(ack) => debug!(success = ack.success, "upload acknowledged"),
            Err(err) => debug!(error = %err, "could not read upload acknowledgment"),
        }

        Ok(UploadResult {
            bytes: self.upload_size as u64,
            elapsed,
            avg_speed_mbps,
        })
    }
}

/// Upload body where byte `i` is `i mod 256`.
pub fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadAck {
    #[serde(default)]
    success: bool,
    bytes_received: u64,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub bytes: u64,
    pub elapsed: Duration,
    pub avg_speed_mbps: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_repeats_byte_ramp() {
        let data = payload(600);
        assert_eq!(data.len(), 600);
        assert_eq!(data[0], 0);
        assert_eq!(data[255], 255);
        assert_eq!(data[256], 0);
        assert_eq!(data[599], (599 % 256) as u8);
    }

    #[test]
    fn ack_parses_camel_case_body() {
        let ack: UploadAck =
            serde_json::from_str(r#"{"success":true,"bytesReceived":5242880}"#).unwrap();
        assert!(ack.success);
        assert_eq!(ack.bytes_received, 5_242_880);
    }
}
