use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use url::Url;

use super::archive::ArchiveNormalizer;
use crate::{
    api::{ApiClient, CatalogEntry, SearchQuery, SearchResponse},
    domain::{AppError, DownloadFormat, DownloadRequest, Severity},
    renderer::{GatedFetcher, RendererError},
    utils::{has_archive_signature, song_display_name},
};

/// Turns a catalog entry into a chart on disk.
#[derive(Clone)]
pub struct DownloadCoordinator {
    api_client: ApiClient,
    fetcher: Arc<dyn GatedFetcher>,
    normalizer: ArchiveNormalizer,
}

impl DownloadCoordinator {
    pub fn new(
        api_client: ApiClient,
        fetcher: Arc<dyn GatedFetcher>,
        normalizer: ArchiveNormalizer,
    ) -> Self {
        Self {
            api_client,
            fetcher,
            normalizer,
        }
    }

    pub async fn search(&self, query: SearchQuery) -> Result<SearchResponse, AppError> {
        self.api_client
            .search(&query)
            .await
            .map_err(|e| AppError::Api(e.to_string()))
    }

    /// Gated archive endpoint for zips, static file host for single files.
    pub fn download_url(
        &self,
        entry: &CatalogEntry,
        format: DownloadFormat,
    ) -> Result<String, AppError> {
        let digest = entry.digest().ok_or(AppError::MissingDigest)?;
        let config = self.api_client.config();

        match format {
            DownloadFormat::Archive => {
                let filename = if entry.charter.trim().is_empty() {
                    format!("{} - {}", entry.artist, entry.title)
                } else {
                    format!("{} - {} ({})", entry.artist, entry.title, entry.charter)
                };
                let url = Url::parse_with_params(
                    &config.download_endpoint,
                    &[("md5", digest), ("isSng", "false"), ("filename", filename.as_str())],
                )
                .map_err(|e| AppError::Api(format!("bad download endpoint: {}", e)))?;
                Ok(url.to_string())
            }
            DownloadFormat::SingleFile => Ok(format!(
                "{}/{}.{}",
                config.files_endpoint.trim_end_matches('/'),
                digest,
                config.single_file_extension
            )),
        }
    }

    pub async fn download(&self, request: DownloadRequest) -> Result<PathBuf, AppError> {
        let DownloadRequest {
            entry,
            format,
            destination_dir,
        } = request;

        let url = self.download_url(&entry, format)?;
        info!(
            url = %url,
            format = ?format,
            dest = %destination_dir.display(),
            "starting chart download"
        );

        let payload = self.retrieve(&url, format).await?;
        let display_name = song_display_name(&entry.artist, &entry.title);

        match format {
            DownloadFormat::Archive => {
                if !has_archive_signature(&payload) {
                    warn!(url = %url, bytes = payload.len(), "payload is missing the zip signature");
                    return Err(AppError::InvalidPayload(
                        "missing zip signature, the server probably sent an error page".to_string(),
                    ));
                }
                self.normalizer
                    .install(payload, &destination_dir, &display_name)
                    .await
            }
            DownloadFormat::SingleFile => {
                let extension = &self.api_client.config().single_file_extension;
                let path = destination_dir.join(format!("{}.{}", display_name, extension));
                tokio::fs::create_dir_all(&destination_dir).await?;
                tokio::fs::write(&path, &payload).await?;
                info!(path = %path.display(), bytes = payload.len(), "chart saved");
                Ok(path)
            }
        }
    }

    /// Gated fetch through the surface. Single files fall back to a direct GET.
    async fn retrieve(&self, url: &str, format: DownloadFormat) -> Result<Bytes, AppError> {
        let gated = match self.fetcher.ensure_ready().await {
            Ok(()) => self.fetcher.fetch(url).await,
            Err(e) => Err(e),
        };

        let error = match gated {
            Ok(payload) => {
                debug!(
                    url,
                    status = payload.status,
                    content_type = %payload.content_type,
                    bytes = payload.bytes.len(),
                    "gated fetch delivered a file"
                );
                return Ok(payload.bytes);
            }
            Err(e) => e,
        };

        match format {
            DownloadFormat::Archive => Err(gated_error(error)),
            DownloadFormat::SingleFile => {
                warn!(url, "gated fetch failed, trying a direct download: {}", error);
                if let Err(e) = self.api_client.bootstrap_session().await {
                    match e.severity() {
                        Severity::NonFatal => {
                            warn!("direct download without an established session: {}", e)
                        }
                        Severity::Fatal => return Err(e),
                    }
                }
                self.api_client.fetch_direct(url).await.map_err(|direct| {
                    AppError::GatedFetchRejected(format!(
                        "{}; direct download also failed: {}",
                        error, direct
                    ))
                })
            }
        }
    }
}

fn gated_error(error: RendererError) -> AppError {
    match error {
        RendererError::Unavailable(msg) => AppError::RendererUnavailable(msg),
        other => AppError::GatedFetchRejected(other.to_string()),
    }
}
