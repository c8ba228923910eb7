// Response payloads returned by the backend, plus helpers to turn the
// base64 image strings it sends back into files on disk.

use crate::error::{ApiError, Operation, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result of `POST /api/process`. Only the image fields are guaranteed to be
/// meaningful; anything else the backend adds is kept in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_gerber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect_description: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Which image of a [`ProcessResponse`] a decoded payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultImage {
    ConvertedGerber,
    Anomaly,
}

impl ResultImage {
    fn file_suffix(self) -> &'static str {
        match self {
            ResultImage::ConvertedGerber => "converted_gerber",
            ResultImage::Anomaly => "anomaly",
        }
    }
}

impl ProcessResponse {
    /// The image payloads present in this response, in display order.
    pub fn images(&self) -> Vec<(ResultImage, &str)> {
        let mut images = Vec::new();
        if let Some(b64) = &self.converted_gerber {
            images.push((ResultImage::ConvertedGerber, b64.as_str()));
        }
        if let Some(b64) = &self.anomaly_image {
            images.push((ResultImage::Anomaly, b64.as_str()));
        }
        images
    }

    /// Decode every image payload and write it to `dir` as
    /// `<stem>_<kind>.<ext>`. Returns the written paths.
    pub fn save_images(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (kind, payload) in self.images() {
            let bytes = decode_image(payload).map_err(|e| {
                ApiError::InvalidInput(format!("{} is not valid base64: {e}", kind.file_suffix()))
            })?;
            let path = dir.join(format!(
                "{stem}_{}.{}",
                kind.file_suffix(),
                sniff_extension(&bytes)
            ));
            std::fs::write(&path, &bytes)?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved result image");
            written.push(path);
        }
        Ok(written)
    }
}

/// Decode a base64 image, accepting both bare payloads and
/// `data:<mime>;base64,<payload>` URLs.
pub fn decode_image(payload: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let data = match payload.split_once(";base64,") {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => payload,
    };
    STANDARD.decode(data.trim())
}

fn sniff_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG") {
        "png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if bytes.starts_with(b"BM") {
        "bmp"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        "bin"
    }
}

/// JSON answer of the upload endpoints. `upload_image` hands back the raw
/// text; parse it with [`UploadReceipt::parse`] when the fields are needed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UploadReceipt {
    #[serde(default)]
    pub success: bool,
    pub task_id: Option<String>,
    pub message: Option<String>,
    pub original_url: Option<String>,
    pub file_size: Option<u64>,
    pub saved_path: Option<String>,
}

impl UploadReceipt {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|source| ApiError::Decode {
            operation: Operation::Upload,
            source,
        })
    }

    /// Split `original_url` (`.../files/{file_type}/{filename}`) into the
    /// two arguments `get_file` expects.
    pub fn file_ref(&self) -> Option<(&str, &str)> {
        let url = self.original_url.as_deref()?;
        let (_, tail) = url.rsplit_once("/files/")?;
        let (file_type, filename) = tail.split_once('/')?;
        if file_type.is_empty() || filename.is_empty() || filename.contains('/') {
            return None;
        }
        Some((file_type, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PNG_HEADER_B64: &str = "iVBORw0KGgo="; // \x89PNG\r\n\x1a\n

    #[test]
    fn test_process_response_keeps_unknown_fields() {
        let resp: ProcessResponse = serde_json::from_value(json!({
            "convertedGerber": "AAAA",
            "anomalyScore": 0.42,
            "defectDescription": "short circuit",
            "elapsedMs": 1200
        }))
        .unwrap();
        assert_eq!(resp.converted_gerber.as_deref(), Some("AAAA"));
        assert!(resp.anomaly_image.is_none());
        assert_eq!(resp.anomaly_score, Some(0.42));
        assert_eq!(resp.extra.get("elapsedMs"), Some(&json!(1200)));
        assert_eq!(resp.images().len(), 1);
    }

    #[test]
    fn test_empty_process_response() {
        let resp: ProcessResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.images().is_empty());
    }

    #[test]
    fn test_decode_image_accepts_data_urls() {
        let bare = decode_image(PNG_HEADER_B64).unwrap();
        let url = decode_image(&format!("data:image/png;base64,{PNG_HEADER_B64}")).unwrap();
        assert_eq!(bare, url);
        assert_eq!(sniff_extension(&bare), "png");
        assert!(decode_image("not base64!").is_err());
    }

    #[test]
    fn test_save_images_writes_each_payload() {
        let dir = tempfile::tempdir().unwrap();
        let resp = ProcessResponse {
            converted_gerber: Some(PNG_HEADER_B64.into()),
            anomaly_image: Some(PNG_HEADER_B64.into()),
            ..Default::default()
        };
        let written = resp.save_images(dir.path(), "board").unwrap();
        assert_eq!(
            written,
            vec![
                dir.path().join("board_converted_gerber.png"),
                dir.path().join("board_anomaly.png"),
            ]
        );
        assert!(std::fs::read(&written[0]).unwrap().starts_with(b"\x89PNG"));
    }

    #[test]
    fn test_save_images_rejects_bad_payload() {
        let dir = tempfile::tempdir().unwrap();
        let resp = ProcessResponse {
            anomaly_image: Some("%%%".into()),
            ..Default::default()
        };
        let err = resp.save_images(dir.path(), "board").unwrap_err();
        assert!(err.to_string().contains("anomaly"));
    }

    #[test]
    fn test_upload_receipt_file_ref() {
        let receipt = UploadReceipt::parse(
            r#"{"success": true, "task_id": "t1", "message": "ok",
                "original_url": "/api/files/original/t1_original.png",
                "file_size": 10, "saved_path": "uploads/original/t1_original.png"}"#,
        )
        .unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.file_ref(), Some(("original", "t1_original.png")));
        assert!(UploadReceipt::parse("uploaded").is_err());
    }
}
