// Connection smoke test: runs the backend checks one after another and
// prints a pass/fail summary. The helpers here never return errors; a
// failed check is logged and reported as `false` / `None` so the run can
// carry on to the next step.

use crate::api::ApiClient;
use crate::config::{PROCESS_PATH, ROOT_PATH, UPLOAD_GERBER_PATH, UPLOAD_QUERY_PATH};
use crate::models::ProcessResponse;
use crossterm::style::Stylize;
use reqwest::{Method, StatusCode};
use std::path::Path;
use tracing::{error, info};

/// Origin a browser-served front-end would send preflights from.
pub const FRONTEND_ORIGIN: &str = "http://localhost:3000";

/// `true` when `GET /` answers 2xx with a JSON body.
pub fn check_backend_health(api: &ApiClient) -> bool {
    match api.health() {
        Ok(body) => {
            info!(%body, "Backend healthy");
            true
        }
        Err(e) => {
            error!(error = %e, "Backend health check failed");
            false
        }
    }
}

/// `true` when a preflight for the processing route is answered with an
/// `Access-Control-Allow-Origin` header.
pub fn check_cors(api: &ApiClient) -> bool {
    match api.preflight(PROCESS_PATH, FRONTEND_ORIGIN) {
        Ok(preflight) => {
            for (name, value) in &preflight.cors_headers {
                println!("  {name}: {value}");
            }
            preflight.allows_origin()
        }
        Err(e) => {
            error!(error = %e, "CORS preflight failed");
            false
        }
    }
}

/// One route checked by [`probe_endpoints`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointProbe {
    pub method: Method,
    pub url: String,
    /// `None` when the request never got an answer.
    pub status: Option<StatusCode>,
}

impl EndpointProbe {
    /// The route exists: it answered, and with something other than "not
    /// found". Empty POSTs legitimately draw 405 or 422.
    pub fn reachable(&self) -> bool {
        matches!(self.status.map(|s| s.as_u16()), Some(200 | 405 | 422))
    }
}

/// Hit each known route with an empty request and record what comes back.
pub fn probe_endpoints(api: &ApiClient) -> Vec<EndpointProbe> {
    let config = api.config();
    let routes = [
        (Method::GET, config.origin_url(ROOT_PATH)),
        (Method::POST, config.api_url(UPLOAD_QUERY_PATH)),
        (Method::POST, config.api_url(UPLOAD_GERBER_PATH)),
        (Method::POST, config.api_url(PROCESS_PATH)),
    ];
    routes
        .into_iter()
        .map(|(method, url)| {
            let status = match api.probe(method.clone(), &url) {
                Ok(status) => Some(status),
                Err(e) => {
                    error!(%url, error = %e, "Endpoint probe failed");
                    None
                }
            };
            EndpointProbe { method, url, status }
        })
        .collect()
}

/// Upload both images for processing; `None` on any failure.
pub fn process_images(api: &ApiClient, query: &Path, gerber: &Path) -> Option<ProcessResponse> {
    match api.process_images(query, gerber) {
        Ok(result) => {
            info!(
                score = ?result.anomaly_score,
                images = result.images().len(),
                "Processing succeeded"
            );
            Some(result)
        }
        Err(e) => {
            match &e {
                crate::error::ApiError::Server { status, body, .. } => error!(
                    %status,
                    body = body.as_deref().unwrap_or_default(),
                    "Processing failed"
                ),
                _ => error!(error = %e, "Processing request failed"),
            }
            None
        }
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Default)]
pub struct SmokeReport {
    pub health: bool,
    pub cors: bool,
    pub endpoints: Vec<EndpointProbe>,
    pub processing: bool,
}

impl SmokeReport {
    pub fn passed(&self) -> bool {
        self.health && self.cors && self.processing
    }
}

/// Run every check in order and print a summary. Processing uses the given
/// image pair, or the backend's own test images when none is given. Stops
/// after the health check if the backend is not up.
pub fn run(api: &ApiClient, images: Option<(&Path, &Path)>) -> SmokeReport {
    let mut report = SmokeReport::default();

    println!("Checking backend health at {} ...", api.config().origin);
    report.health = check_backend_health(api);
    print_step("backend health", report.health);
    if !report.health {
        println!("Backend is not available; start it and try again.");
        return report;
    }

    println!("\nChecking CORS support ...");
    report.cors = check_cors(api);
    print_step("CORS", report.cors);

    println!("\nProbing endpoints ...");
    report.endpoints = probe_endpoints(api);
    for probe in &report.endpoints {
        let status = probe
            .status
            .map(|s| s.as_u16().to_string())
            .unwrap_or_else(|| "no answer".into());
        println!(
            "  {} {} {} ({status})",
            mark(probe.reachable()),
            probe.method,
            probe.url
        );
    }

    println!("\nProcessing images ...");
    let result = match images {
        Some((query, gerber)) => process_images(api, query, gerber),
        None => api
            .process_test_images()
            .map_err(|e| error!(error = %e, "Processing test images failed"))
            .ok(),
    };
    if let Some(result) = &result {
        if let Some(score) = result.anomaly_score {
            println!("  anomaly score: {score:.3}");
        }
        if let Some(desc) = &result.defect_description {
            println!("  defect: {desc}");
        }
        println!("  images returned: {}", result.images().len());
    }
    report.processing = result.is_some();
    print_step("processing", report.processing);

    println!("\nSummary:");
    print_step("backend health", report.health);
    print_step("CORS", report.cors);
    print_step("processing", report.processing);
    report
}

fn mark(ok: bool) -> String {
    if ok {
        "PASS".green().to_string()
    } else {
        "FAIL".red().to_string()
    }
}

fn print_step(name: &str, ok: bool) {
    println!("  {} {name}", mark(ok));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blocking, client_for, write_image, UNREACHABLE};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_false_on_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"status": "bad"})))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        assert!(!blocking(move || check_backend_health(&client_for(&uri))).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_false_on_non_json_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        assert!(!blocking(move || check_backend_health(&client_for(&uri))).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_health_true_on_json_ok() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        assert!(blocking(move || check_backend_health(&client_for(&uri))).await);
    }

    #[test]
    fn test_health_false_when_unreachable() {
        assert!(!check_backend_health(&client_for(UNREACHABLE)));
    }

    #[test]
    fn test_process_none_when_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let query = write_image(&dir, "query.png");
        let gerber = write_image(&dir, "gerber.png");
        assert!(process_images(&client_for(UNREACHABLE), &query, &gerber).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_probe_and_run_report() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("OPTIONS"))
            .and(path("/api/process"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("Access-Control-Allow-Origin", "*"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/upload/query"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/process-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "anomalyScore": 0.5,
                "defectDescription": "none"
            })))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let report = blocking(move || run(&client_for(&uri), None)).await;
        assert!(report.health);
        assert!(report.cors);
        assert!(report.processing);
        assert!(report.passed());

        let reachable: Vec<bool> = report.endpoints.iter().map(|p| p.reachable()).collect();
        // `/upload/gerber` and `/process` are not mounted and answer 404.
        assert_eq!(reachable, vec![true, true, false, false]);
    }

    #[test]
    fn test_run_stops_when_backend_down() {
        let report = run(&client_for(UNREACHABLE), None);
        assert!(!report.health);
        assert!(report.endpoints.is_empty());
        assert!(!report.passed());
    }
}
