// Helpers shared by the HTTP tests.

use crate::api::ApiClient;
use crate::config::ApiConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Nothing listens on port 1, so connecting is refused.
pub const UNREACHABLE: &str = "http://127.0.0.1:1";

/// Run `f` off the async workers; the blocking client must not run on one.
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

pub fn client_for(uri: &str) -> ApiClient {
    let mut config = ApiConfig::new(uri);
    config.request_timeout = Duration::from_secs(5);
    config.health_timeout = Duration::from_secs(2);
    ApiClient::new(config).unwrap()
}

/// Write a small ASCII fixture so multipart bodies stay valid UTF-8.
pub fn write_image(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"fake image data").unwrap();
    path
}
