// API client module: a blocking HTTP client for the image/Gerber
// processing backend. Every call carries its own deadline and returns the
// crate-wide `ApiError`, so callers see one failure type whichever route
// they hit.

use crate::config::{
    ApiConfig, PROCESS_PATH, PROCESS_TEST_PATH, ROOT_PATH, TEST_IMAGES_PATH, UPLOAD_GERBER_PATH,
    UPLOAD_PATH, UPLOAD_QUERY_PATH,
};
use crate::error::{ApiError, Operation, Result};
use crate::models::ProcessResponse;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// MIME types sent for known image extensions. Anything else goes out as
/// `application/octet-stream` and the backend decides whether to accept it.
const IMAGE_MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
];

/// Which upload route a file is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    /// `POST /upload`
    Image,
    /// `POST /upload/query`
    Query,
    /// `POST /upload/gerber`
    Gerber,
}

impl UploadTarget {
    fn path(self) -> &'static str {
        match self {
            UploadTarget::Image => UPLOAD_PATH,
            UploadTarget::Query => UPLOAD_QUERY_PATH,
            UploadTarget::Gerber => UPLOAD_GERBER_PATH,
        }
    }
}

/// Outcome of a CORS preflight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub status: StatusCode,
    /// Every `access-control-*` header of the answer, lowercased names.
    pub cors_headers: Vec<(String, String)>,
}

impl Preflight {
    pub fn allows_origin(&self) -> bool {
        self.cors_headers
            .iter()
            .any(|(name, _)| name == "access-control-allow-origin")
    }
}

/// Blocking client bound to one backend.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gerber-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(ApiClient { client, config })
    }

    /// Build a client from the `GERBER_*` environment variables. See
    /// [`ApiConfig::from_env`].
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ApiConfig::from_env()?;
        Ok(Self::new(config)?)
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// `GET /` on the server origin. Succeeds with the JSON body when the
    /// backend answers 2xx.
    #[tracing::instrument(skip(self))]
    pub fn health(&self) -> Result<serde_json::Value> {
        let url = self.config.origin_url(ROOT_PATH);
        let req = self.client.get(&url);
        let res = self.send(Operation::Health, req, self.config.health_timeout)?;
        json_or_server(Operation::Health, res)
    }

    /// `GET <base>/`. Returns the body text verbatim.
    #[tracing::instrument(skip(self))]
    pub fn test_root(&self) -> Result<String> {
        let url = self.config.api_url(ROOT_PATH);
        let req = self.client.get(&url);
        let res = self.send(Operation::RootTest, req, self.config.request_timeout)?;
        if !res.status().is_success() {
            return Err(ApiError::Server {
                operation: Operation::RootTest,
                status: res.status(),
                body: None,
            });
        }
        Ok(res.text()?)
    }

    /// Upload one image as multipart field `file` to `POST <base>/upload`.
    /// Returns the raw body; see [`crate::models::UploadReceipt`].
    pub fn upload_image(&self, file_path: &Path) -> Result<String> {
        self.upload(UploadTarget::Image, file_path)
    }

    pub fn upload_query_image(&self, file_path: &Path) -> Result<String> {
        self.upload(UploadTarget::Query, file_path)
    }

    pub fn upload_gerber_image(&self, file_path: &Path) -> Result<String> {
        self.upload(UploadTarget::Gerber, file_path)
    }

    #[tracing::instrument(skip(self))]
    pub fn upload(&self, target: UploadTarget, file_path: &Path) -> Result<String> {
        let url = self.config.api_url(target.path());
        let form = multipart::Form::new().part("file", image_part(file_path)?);
        let req = self.client.post(&url).multipart(form);
        let res = self.send(Operation::Upload, req, self.config.request_timeout)?;
        text_or_validation(Operation::Upload, res)
    }

    /// `GET <base>/files/{file_type}/{filename}`. Returns the body text,
    /// typically a URL or a base64 payload.
    ///
    /// Both segments are inserted without encoding, so anything that would
    /// change the shape of the path is refused before a request is made.
    #[tracing::instrument(skip(self))]
    pub fn get_file(&self, file_type: &str, filename: &str) -> Result<String> {
        check_segment(file_type)?;
        check_segment(filename)?;
        let url = self.config.file_url(file_type, filename);
        let req = self.client.get(&url);
        let res = self.send(Operation::GetFile, req, self.config.request_timeout)?;
        text_or_validation(Operation::GetFile, res)
    }

    /// Send a query image and its Gerber rendering to `POST <base>/process`
    /// together with the configured model.
    #[tracing::instrument(skip(self))]
    pub fn process_images(&self, query: &Path, gerber: &Path) -> Result<ProcessResponse> {
        let url = self.config.api_url(PROCESS_PATH);
        let form = multipart::Form::new()
            .part("query", image_part(query)?)
            .part("gerber", image_part(gerber)?)
            .text("model", self.config.model.clone());
        let req = self.client.post(&url).multipart(form);
        let res = self.send(Operation::Process, req, self.config.request_timeout)?;
        json_or_server(Operation::Process, res)
    }

    /// `GET <base>/test-images`: what the backend has in its test image directory.
    pub fn list_test_images(&self) -> Result<serde_json::Value> {
        let url = self.config.api_url(TEST_IMAGES_PATH);
        let req = self.client.get(&url);
        let res = self.send(Operation::TestImages, req, self.config.request_timeout)?;
        json_or_server(Operation::TestImages, res)
    }

    /// Run the processing pipeline on the backend's own test images.
    pub fn process_test_images(&self) -> Result<ProcessResponse> {
        let url = self.config.api_url(PROCESS_TEST_PATH);
        let form = multipart::Form::new().text("model", self.config.model.clone());
        let req = self.client.post(&url).multipart(form);
        let res = self.send(Operation::Process, req, self.config.request_timeout)?;
        json_or_server(Operation::Process, res)
    }

    /// Send a CORS preflight for `POST <base><path>` as a browser served
    /// from `request_origin` would. Any status is a successful preflight;
    /// only transport failures are errors.
    #[tracing::instrument(skip(self))]
    pub fn preflight(&self, path: &str, request_origin: &str) -> Result<Preflight> {
        let url = self.config.api_url(path);
        let req = self
            .client
            .request(Method::OPTIONS, &url)
            .header("Origin", request_origin)
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "Content-Type");
        let res = self.send(Operation::Preflight, req, self.config.health_timeout)?;
        let cors_headers = res
            .headers()
            .iter()
            .filter(|(name, _)| name.as_str().starts_with("access-control-"))
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        Ok(Preflight {
            status: res.status(),
            cors_headers,
        })
    }

    /// Hit `url` with an empty request and report the status, whatever it
    /// is. Used to check that a route exists.
    pub fn probe(&self, method: Method, url: &str) -> Result<StatusCode> {
        let req = self.client.request(method, url);
        let res = self.send(Operation::Probe, req, self.config.health_timeout)?;
        Ok(res.status())
    }

    /// Send with a deadline, logging transport failures.
    fn send(&self, operation: Operation, req: RequestBuilder, timeout: Duration) -> Result<Response> {
        let req = req.timeout(timeout).build()?;
        debug!(
            operation = %operation,
            method = %req.method(),
            url = %req.url(),
            timeout_ms = timeout.as_millis() as u64,
            "Sending request"
        );
        match self.client.execute(req) {
            Ok(res) => {
                debug!(operation = %operation, status = %res.status(), "Received response");
                Ok(res)
            }
            Err(e) => {
                warn!(operation = %operation, error = %e, timeout = e.is_timeout(), "Request failed");
                Err(ApiError::Network(e))
            }
        }
    }
}

/// Success: the body text. 422: a validation error carrying the serialized
/// `detail` field. Anything else: a generic failure, body left unread.
fn text_or_validation(operation: Operation, res: Response) -> Result<String> {
    let status = res.status();
    if status.is_success() {
        return Ok(res.text()?);
    }
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        let body = res.text()?;
        let payload: serde_json::Value = serde_json::from_str(&body)
            .map_err(|source| ApiError::Decode { operation, source })?;
        let detail = serde_json::to_string(payload.get("detail").unwrap_or(&serde_json::Value::Null))
            .map_err(|source| ApiError::Decode { operation, source })?;
        warn!(operation = %operation, detail = %detail, "Backend rejected request");
        return Err(ApiError::Validation { operation, detail });
    }
    warn!(operation = %operation, status = %status, "Backend returned an error status");
    Err(ApiError::Server {
        operation,
        status,
        body: None,
    })
}

/// Success: the body parsed as `T`. Otherwise a server error that keeps the
/// status and body text for diagnostics.
fn json_or_server<T: DeserializeOwned>(operation: Operation, res: Response) -> Result<T> {
    let status = res.status();
    let body = res.text()?;
    if !status.is_success() {
        warn!(operation = %operation, status = %status, body = %body, "Backend returned an error status");
        return Err(ApiError::Server {
            operation,
            status,
            body: Some(body),
        });
    }
    serde_json::from_str(&body).map_err(|source| ApiError::Decode { operation, source })
}

/// Wrap a local file as a multipart part named after the file. The MIME
/// type comes from the extension; unknown extensions (Gerber `.gbr`, for
/// one) are sent as opaque binary.
fn image_part(file_path: &Path) -> Result<multipart::Part> {
    let metadata = std::fs::metadata(file_path)?;
    if !metadata.is_file() {
        return Err(ApiError::InvalidInput(format!(
            "{} is not a file",
            file_path.display()
        )));
    }
    let file_name = file_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload")
        .to_string();
    let file = File::open(file_path)?;
    let part = multipart::Part::reader_with_length(file, metadata.len())
        .file_name(file_name)
        .mime_str(mime_for(file_path))?;
    Ok(part)
}

fn mime_for(file_path: &Path) -> &'static str {
    let extension = file_path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    IMAGE_MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

fn check_segment(segment: &str) -> Result<()> {
    let breaks_path = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '?', '#']);
    if breaks_path {
        return Err(ApiError::InvalidPathSegment(segment.to_string()));
    }
    Ok(())
}
