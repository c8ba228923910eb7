// Configuration holder: where the backend lives and how long we are
// willing to wait for it. Defaults match a backend started locally on
// port 8000; every field can be overridden from the environment.

use anyhow::{bail, Context, Result};
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8000";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_MODEL: &str = "256";

pub const ROOT_PATH: &str = "/";
pub const UPLOAD_PATH: &str = "/upload";
pub const UPLOAD_QUERY_PATH: &str = "/upload/query";
pub const UPLOAD_GERBER_PATH: &str = "/upload/gerber";
pub const FILE_PATH_TEMPLATE: &str = "/files/{file_type}/{filename}";
pub const PROCESS_PATH: &str = "/process";
pub const PROCESS_TEST_PATH: &str = "/process-test";
pub const TEST_IMAGES_PATH: &str = "/test-images";

/// Connection settings shared by every request the client makes.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Scheme, host and port of the backend, without a trailing slash.
    pub origin: String,
    /// Prefix every API route is mounted under (`/api`). May be empty.
    pub api_prefix: String,
    /// Value sent as the `model` field of processing requests.
    pub model: String,
    pub request_timeout: Duration,
    pub health_timeout: Duration,
    /// Where decoded result images are written.
    pub output_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

impl ApiConfig {
    /// Default settings pointed at `origin`.
    pub fn new(origin: &str) -> Self {
        Self {
            origin: normalize_origin(origin),
            api_prefix: normalize_prefix(DEFAULT_API_PREFIX),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            output_dir: default_output_dir(),
        }
    }

    /// Load settings from the process environment.
    ///
    /// Recognized variables: `GERBER_API_URL`, `GERBER_API_PREFIX`,
    /// `GERBER_MODEL`, `GERBER_TIMEOUT_SECS`, `GERBER_HEALTH_TIMEOUT_SECS`
    /// and `GERBER_OUTPUT_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ApiConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let origin: String = load(&lookup, "GERBER_API_URL", defaults.origin)?;
        let origin = normalize_origin(&origin);
        check_origin(&origin)?;
        let api_prefix: String = load(&lookup, "GERBER_API_PREFIX", defaults.api_prefix)?;
        let model = load(&lookup, "GERBER_MODEL", defaults.model)?;
        let request_timeout = load_timeout(&lookup, "GERBER_TIMEOUT_SECS", defaults.request_timeout)?;
        let health_timeout =
            load_timeout(&lookup, "GERBER_HEALTH_TIMEOUT_SECS", defaults.health_timeout)?;
        let output_dir: PathBuf = load(&lookup, "GERBER_OUTPUT_DIR", defaults.output_dir)?;

        Ok(Self {
            origin,
            api_prefix: normalize_prefix(&api_prefix),
            model,
            request_timeout,
            health_timeout,
            output_dir,
        })
    }

    /// Absolute URL of a route outside the API prefix (the health check).
    pub fn origin_url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    /// Absolute URL of a route under the API prefix.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.origin, self.api_prefix, path)
    }

    /// Substitute both placeholders of the file-retrieval template.
    /// Segments are inserted as given; callers validate them first.
    pub fn file_url(&self, file_type: &str, filename: &str) -> String {
        let path = FILE_PATH_TEMPLATE
            .replace("{file_type}", file_type)
            .replace("{filename}", filename);
        self.api_url(&path)
    }
}

fn load<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr + Debug,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {raw:?}")),
        None => {
            info!("{key} not set, using default: {default:?}");
            Ok(default)
        }
    }
}

/// Seconds from the environment; zero would fail every request at once.
fn load_timeout<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = load(lookup, key, default.as_secs())?;
    if secs == 0 {
        bail!("{key} must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

/// The origin must be an absolute http(s) URL with a host.
fn check_origin(origin: &str) -> Result<()> {
    let url = reqwest::Url::parse(origin)
        .with_context(|| format!("Invalid value for GERBER_API_URL: {origin:?}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        bail!("GERBER_API_URL must be an http(s) URL with a host, got {origin:?}");
    }
    Ok(())
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn default_output_dir() -> PathBuf {
    dirs::picture_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ApiConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.origin, "http://127.0.0.1:8000");
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.model, "256");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.health_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides_are_normalized() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("GERBER_API_URL", "http://backend:9000/"),
            ("GERBER_API_PREFIX", "v2/"),
            ("GERBER_TIMEOUT_SECS", "7"),
            ("GERBER_OUTPUT_DIR", "/tmp/out"),
        ]))
        .unwrap();
        assert_eq!(config.origin, "http://backend:9000");
        assert_eq!(config.api_prefix, "/v2");
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.api_url(UPLOAD_PATH), "http://backend:9000/v2/upload");
    }

    #[test]
    fn test_unparsable_timeout_is_an_error() {
        let err = ApiConfig::from_lookup(lookup_from(&[("GERBER_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("GERBER_TIMEOUT_SECS"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = ApiConfig::from_lookup(lookup_from(&[("GERBER_HEALTH_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("GERBER_HEALTH_TIMEOUT_SECS"));
        assert!(ApiConfig::from_lookup(lookup_from(&[("GERBER_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn test_bad_origin_fails_at_startup() {
        for origin in ["localhost:8000", "not a url", "ftp://backend", "file:///tmp"] {
            let err = ApiConfig::from_lookup(lookup_from(&[("GERBER_API_URL", origin)]))
                .unwrap_err();
            assert!(err.to_string().contains("GERBER_API_URL"), "{origin}: {err}");
        }
    }

    #[test]
    fn test_output_dir_defaults_when_unset() {
        let config = ApiConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.output_dir, default_output_dir());
    }

    #[test]
    fn test_url_building() {
        let config = ApiConfig::new("http://localhost:8000");
        assert_eq!(config.origin_url(ROOT_PATH), "http://localhost:8000/");
        assert_eq!(config.api_url(ROOT_PATH), "http://localhost:8000/api/");
        assert_eq!(
            config.file_url("original", "a.png"),
            "http://localhost:8000/api/files/original/a.png"
        );
    }

    #[test]
    fn test_empty_prefix() {
        let mut config = ApiConfig::new("http://localhost:8000");
        config.api_prefix = normalize_prefix("/");
        assert_eq!(config.api_url(PROCESS_PATH), "http://localhost:8000/process");
    }
}
