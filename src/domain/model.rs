use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{AppError, ErrorKind};
use crate::api::CatalogEntry;

/// How a chart is delivered to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    /// Zip container, unpacked into a folder.
    #[default]
    #[serde(alias = "zip")]
    Archive,
    /// One packed `.sng` file, written as-is.
    #[serde(alias = "sng", rename = "single-file")]
    SingleFile,
}

impl fmt::Display for DownloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadFormat::Archive => write!(f, "ZIP folder"),
            DownloadFormat::SingleFile => write!(f, "SNG file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub entry: CatalogEntry,
    pub format: DownloadFormat,
    pub destination_dir: PathBuf,
}

/// Outcome handed back to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub success: bool,
    pub final_path: Option<PathBuf>,
    pub error_kind: Option<ErrorKind>,
}

impl From<&Result<PathBuf, AppError>> for DownloadResult {
    fn from(outcome: &Result<PathBuf, AppError>) -> Self {
        match outcome {
            Ok(path) => Self {
                success: true,
                final_path: Some(path.clone()),
                error_kind: None,
            },
            Err(e) => Self {
                success: false,
                final_path: None,
                error_kind: Some(e.kind()),
            },
        }
    }
}

/// Lifecycle of the shared offscreen rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererSurfaceState {
    Uninitialized,
    Loading,
    Ready,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Searching,
    Downloading,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_accepts_legacy_setting_names() {
        let zip: DownloadFormat = serde_json::from_str("\"zip\"").unwrap();
        let sng: DownloadFormat = serde_json::from_str("\"sng\"").unwrap();
        assert_eq!(zip, DownloadFormat::Archive);
        assert_eq!(sng, DownloadFormat::SingleFile);
        assert_eq!(
            serde_json::to_string(&DownloadFormat::SingleFile).unwrap(),
            "\"single-file\""
        );
    }

    #[test]
    fn result_carries_error_kind_on_failure() {
        let failed: Result<PathBuf, AppError> = Err(AppError::ExtractionFailed("bad".into()));
        let result = DownloadResult::from(&failed);
        assert!(!result.success);
        assert_eq!(result.final_path, None);
        assert_eq!(result.error_kind, Some(ErrorKind::ExtractionFailed));
    }
}
