// UI layer: a simple interactive menu using `dialoguer`.
// Each entry collects its inputs, calls the API client behind a spinner
// and prints the outcome. Failures are printed and the menu continues.

use crate::api::ApiClient;
use crate::models::UploadReceipt;
use crate::smoke;
use anyhow::Result;
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    Health,
    RootTest,
    Upload,
    UploadQuery,
    UploadGerber,
    GetFile,
    Process,
    ProcessTestImages,
    ListTestImages,
    Smoke,
    Exit,
}

impl MenuItem {
    const ALL: [MenuItem; 11] = [
        MenuItem::Health,
        MenuItem::RootTest,
        MenuItem::Upload,
        MenuItem::UploadQuery,
        MenuItem::UploadGerber,
        MenuItem::GetFile,
        MenuItem::Process,
        MenuItem::ProcessTestImages,
        MenuItem::ListTestImages,
        MenuItem::Smoke,
        MenuItem::Exit,
    ];

    fn label(self) -> &'static str {
        match self {
            MenuItem::Health => "Check backend health",
            MenuItem::RootTest => "Test API root",
            MenuItem::Upload => "Upload image",
            MenuItem::UploadQuery => "Upload query image",
            MenuItem::UploadGerber => "Upload Gerber image",
            MenuItem::GetFile => "Get file",
            MenuItem::Process => "Process images",
            MenuItem::ProcessTestImages => "Process backend test images",
            MenuItem::ListTestImages => "List backend test images",
            MenuItem::Smoke => "Run smoke test",
            MenuItem::Exit => "Exit",
        }
    }
}

/// Main interactive menu. Runs until the user chooses "Exit".
pub fn main_menu(api: &ApiClient) -> Result<()> {
    let labels: Vec<&str> = MenuItem::ALL.iter().map(|item| item.label()).collect();
    loop {
        let selection = Select::new()
            .with_prompt(format!("Backend {}", api.config().origin))
            .items(&labels)
            .default(0)
            .interact()?;
        match MenuItem::ALL[selection] {
            MenuItem::Health => match with_spinner("Checking...", || api.health())? {
                Ok(body) => println!("Backend healthy: {body}"),
                Err(e) => println!("Backend unavailable: {e}"),
            },
            MenuItem::RootTest => match with_spinner("Requesting...", || api.test_root())? {
                Ok(body) => println!("{body}"),
                Err(e) => println!("{e}"),
            },
            MenuItem::Upload => handle_upload(|p| api.upload_image(p))?,
            MenuItem::UploadQuery => handle_upload(|p| api.upload_query_image(p))?,
            MenuItem::UploadGerber => handle_upload(|p| api.upload_gerber_image(p))?,
            MenuItem::GetFile => handle_get_file(api)?,
            MenuItem::Process => handle_process(api)?,
            MenuItem::ProcessTestImages => {
                match with_spinner("Processing...", || api.process_test_images())? {
                    Ok(result) => print_process_result(api, &result, "test"),
                    Err(e) => print_failure(&e),
                }
            }
            MenuItem::ListTestImages => {
                match with_spinner("Requesting...", || api.list_test_images())? {
                    Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                    Err(e) => println!("{e}"),
                }
            }
            MenuItem::Smoke => {
                smoke::run(api, None);
            }
            MenuItem::Exit => break,
        }
    }
    Ok(())
}

/// Show a spinner while `f` runs.
fn with_spinner<T>(message: &'static str, f: impl FnOnce() -> T) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let out = f();
    spinner.finish_and_clear();
    Ok(out)
}

fn prompt_path(prompt: &str) -> Result<PathBuf> {
    let path: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(path.trim()))
}

/// Ask for a file, upload it with `upload` and show what the backend stored.
fn handle_upload<F>(upload: F) -> Result<()>
where
    F: FnOnce(&Path) -> crate::error::Result<String>,
{
    let path = prompt_path("File path")?;
    match with_spinner("Uploading...", || upload(&path))? {
        Ok(body) => {
            println!("Upload successful");
            match UploadReceipt::parse(&body) {
                Ok(receipt) => {
                    if let Some(message) = &receipt.message {
                        println!("  {message}");
                    }
                    if let Some((file_type, filename)) = receipt.file_ref() {
                        println!("  stored as {file_type}/{filename}");
                    }
                }
                Err(_) => println!("  {body}"),
            }
        }
        Err(e) => println!("Upload failed: {e}"),
    }
    Ok(())
}

fn handle_get_file(api: &ApiClient) -> Result<()> {
    let file_type: String = Input::new()
        .with_prompt("File type")
        .default("original".into())
        .interact_text()?;
    let filename: String = Input::new().with_prompt("File name").interact_text()?;
    match with_spinner("Fetching...", || api.get_file(file_type.trim(), filename.trim()))? {
        Ok(body) => println!("{body}"),
        Err(e) => println!("{e}"),
    }
    Ok(())
}

fn handle_process(api: &ApiClient) -> Result<()> {
    let query = prompt_path("Query image path")?;
    let gerber = prompt_path("Gerber image path")?;
    match with_spinner("Processing...", || api.process_images(&query, &gerber))? {
        Ok(result) => {
            let stem = query
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("result")
                .to_string();
            print_process_result(api, &result, &stem);
        }
        Err(e) => print_failure(&e),
    }
    Ok(())
}

/// Print the score and description, then write the returned images to the
/// configured output directory.
fn print_process_result(api: &ApiClient, result: &crate::models::ProcessResponse, stem: &str) {
    if let Some(score) = result.anomaly_score {
        println!("Anomaly score: {score:.3}");
    }
    if let Some(desc) = &result.defect_description {
        println!("Defect: {desc}");
    }
    match result.save_images(&api.config().output_dir, stem) {
        Ok(paths) if paths.is_empty() => println!("No images returned"),
        Ok(paths) => {
            for path in paths {
                println!("Saved {}", path.display());
            }
        }
        Err(e) => println!("Could not save images: {e}"),
    }
}

fn print_failure(e: &crate::error::ApiError) {
    println!("Processing failed: {e}");
    if let crate::error::ApiError::Server {
        body: Some(body), ..
    } = e
    {
        println!("  {body}");
    }
}
