use anyhow::{Context, Result};
use reqwest::Url;
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3000/";

const PING_PATH: &str = "api/ping";
const DOWNLOAD_PATH: &str = "api/download";
const UPLOAD_PATH: &str = "api/upload";

const MIB: u64 = 1024 * 1024;

/// Endpoint URLs of the speed test server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub ping: Url,
    pub download: Url,
    pub upload: Url,
}

impl Endpoints {
    /// Resolves the three endpoints relative to `base`.
    ///
    /// A base without a trailing slash is treated as a directory, so
    /// `http://host/speed` resolves to `http://host/speed/api/ping`.
    pub fn from_base(base: &str) -> Result<Self> {
        let mut base = Url::parse(base).with_context(|| format!("invalid server url `{base}`"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            ping: base.join(PING_PATH)?,
            download: base.join(DOWNLOAD_PATH)?,
            upload: base.join(UPLOAD_PATH)?,
        })
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::from_base(DEFAULT_SERVER).expect("default server url is valid")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Applies to each ping probe on its own.
    pub ping_probe: Duration,
    /// Applies to the whole download stage, streaming included.
    pub download: Duration,
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ping_probe: Duration::from_secs(5),
            download: Duration::from_secs(60),
            upload: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub ping_count: usize,
    pub ping_interval: Duration,
    /// Size the download endpoint is expected to serve, used to scale progress.
    pub download_size_mib: u64,
    pub upload_size_mib: u64,
    pub timeouts: Timeouts,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            ping_count: 5,
            ping_interval: Duration::from_millis(100),
            download_size_mib: 10,
            upload_size_mib: 5,
            timeouts: Timeouts::default(),
        }
    }
}

impl Settings {
    pub fn with_server(server: &str) -> Result<Self> {
        Ok(Self {
            endpoints: Endpoints::from_base(server)?,
            ..Self::default()
        })
    }

    pub fn download_size_bytes(&self) -> u64 {
        self.download_size_mib * MIB
    }

    pub fn upload_size_bytes(&self) -> usize {
        (self.upload_size_mib * MIB) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    PingCount,
    DownloadSize,
    UploadSize,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::PingCount => SettingsField::DownloadSize,
            SettingsField::DownloadSize => SettingsField::UploadSize,
            SettingsField::UploadSize => SettingsField::PingCount,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            SettingsField::PingCount => SettingsField::UploadSize,
            SettingsField::DownloadSize => SettingsField::PingCount,
            SettingsField::UploadSize => SettingsField::DownloadSize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_sizes() {
        let settings = Settings::default();
        assert_eq!(settings.ping_count, 5);
        assert_eq!(settings.ping_interval, Duration::from_millis(100));
        assert_eq!(settings.download_size_bytes(), 10_485_760);
        assert_eq!(settings.upload_size_bytes(), 5_242_880);
    }

    #[test]
    fn endpoints_resolve_under_base_path() {
        let endpoints = Endpoints::from_base("http://example.com:8080/speed").unwrap();
        assert_eq!(endpoints.ping.as_str(), "http://example.com:8080/speed/api/ping");
        assert_eq!(endpoints.download.as_str(), "http://example.com:8080/speed/api/download");
        assert_eq!(endpoints.upload.as_str(), "http://example.com:8080/speed/api/upload");
    }

    #[test]
    fn endpoints_resolve_at_root() {
        let endpoints = Endpoints::from_base("http://localhost:3000").unwrap();
        assert_eq!(endpoints.ping.as_str(), "http://localhost:3000/api/ping");
    }

    #[test]
    fn rejects_garbage_server() {
        assert!(Settings::with_server("not a url").is_err());
    }

    #[test]
    fn settings_fields_cycle() {
        let field = SettingsField::PingCount;
        assert_eq!(field.next().next().next(), field);
        assert_eq!(field.prev(), SettingsField::UploadSize);
    }
}
