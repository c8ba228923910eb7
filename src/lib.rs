// Library root
// -----------
// A client for the PCB image / Gerber processing backend. The binary
// (`main.rs`) composes these modules into an interactive CLI and a
// non-interactive smoke test.
//
// Module responsibilities:
// - `config`: where the backend lives, route templates, request deadlines.
// - `error`: the single error type every backend call returns.
// - `models`: response payloads and base64 image decoding.
// - `api`: blocking HTTP calls against the backend.
// - `smoke`: sequential connection checks with a printed summary.
// - `ui`: terminal menu flows that delegate to `api`.
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod smoke;
pub mod ui;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use config::ApiConfig;
pub use error::{ApiError, ErrorKind, Result};
