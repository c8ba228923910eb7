// Entrypoint for the CLI application.
// - `gerber-cli` starts the interactive menu.
// - `gerber-cli smoke [QUERY GERBER]` runs the connection checks once and
//   exits non-zero if any of them failed.

use anyhow::{bail, Context};
use gerber_cli::{smoke, ui::main_menu, ApiClient};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with menu output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gerber_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Configured by the `GERBER_*` environment variables, see
    // `config::ApiConfig::from_env`.
    let api = ApiClient::from_env().context("Failed to configure API client")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => main_menu(&api),
        Some("smoke") => {
            let images = match &args[1..] {
                [] => None,
                [query, gerber] => Some((PathBuf::from(query), PathBuf::from(gerber))),
                _ => bail!("usage: gerber-cli smoke [QUERY_IMAGE GERBER_IMAGE]"),
            };
            let report = smoke::run(
                &api,
                images.as_ref().map(|(q, g)| (q.as_path(), g.as_path())),
            );
            if !report.passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(other) => bail!("unknown command {other:?}; expected no arguments or `smoke`"),
    }
}
