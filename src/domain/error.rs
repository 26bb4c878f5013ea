use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged and skipped; the caller carries on.
    NonFatal,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingDigest,
    BootstrapFailed,
    RendererUnavailable,
    GatedFetchRejected,
    InvalidPayload,
    ExtractionFailed,
    Filesystem,
    Api,
    Settings,
}

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Chart has no content digest, cannot build a download URL")]
    MissingDigest,

    #[error("Session bootstrap failed: {0}")]
    BootstrapFailed(String),

    #[error("Download browser is unavailable: {0}")]
    RendererUnavailable(String),

    #[error("Server refused the download: {0}")]
    GatedFetchRejected(String),

    #[error("Downloaded file is not a valid archive: {0}")]
    InvalidPayload(String),

    #[error("Failed to extract archive: {0}")]
    ExtractionFailed(String),

    #[error("File system error: {0}")]
    Filesystem(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingDigest => ErrorKind::MissingDigest,
            AppError::BootstrapFailed(_) => ErrorKind::BootstrapFailed,
            AppError::RendererUnavailable(_) => ErrorKind::RendererUnavailable,
            AppError::GatedFetchRejected(_) => ErrorKind::GatedFetchRejected,
            AppError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            AppError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            AppError::Filesystem(_) => ErrorKind::Filesystem,
            AppError::Api(_) => ErrorKind::Api,
            AppError::Settings(_) => ErrorKind::Settings,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AppError::BootstrapFailed(_) => Severity::NonFatal,
            _ => Severity::Fatal,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Filesystem(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_failure_is_the_only_non_fatal_error() {
        assert_eq!(
            AppError::BootstrapFailed("offline".into()).severity(),
            Severity::NonFatal
        );
        assert_eq!(
            AppError::InvalidPayload("html".into()).severity(),
            Severity::Fatal
        );
        assert_eq!(AppError::MissingDigest.severity(), Severity::Fatal);
    }

    #[test]
    fn io_errors_map_to_filesystem_kind() {
        let err: AppError = std::io::Error::other("read-only").into();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(err.to_string().contains("read-only"));
    }
}
