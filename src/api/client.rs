use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{SearchQuery, SearchResponse, SiteConfig};
use super::session::SessionStore;
use crate::domain::Severity;

const ACCEPT_DOCUMENT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json, text/plain, */*";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// HTTP client that carries the shared session cookies on every request.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    config: Arc<SiteConfig>,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: SiteConfig) -> Result<Self> {
        Self::with_session(config, Arc::new(SessionStore::new()))
    }

    pub fn with_session(config: SiteConfig, session: Arc<SessionStore>) -> Result<Self> {
        let http = Client::builder().user_agent(&config.user_agent).build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            session,
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Attaches stored cookies, sends, and captures any cookies the server sets.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.session.cookie_header() {
            Some(cookies) => request.header(COOKIE, cookies),
            None => request,
        };

        let response = request.send().await?;

        for value in response.headers().get_all(SET_COOKIE) {
            match value.to_str() {
                Ok(raw) if self.session.store_set_cookie(raw) => {}
                _ => warn!(url = %response.url(), "ignoring unparseable Set-Cookie header"),
            }
        }

        Ok(response)
    }

    /// GET with the headers a browser sends for a top-level navigation.
    pub async fn get_document(&self, url: &str) -> Result<Response> {
        debug!(url, "GET document");
        self.send(
            self.http
                .get(url)
                .header(ACCEPT, ACCEPT_DOCUMENT)
                .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                .header("Upgrade-Insecure-Requests", "1"),
        )
        .await
    }

    /// Runs the search call without touching the bootstrap handshake.
    pub async fn post_search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let response = self
            .send(
                self.http
                    .post(&self.config.search_endpoint)
                    .header(ACCEPT, ACCEPT_JSON)
                    .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                    .header("Origin", &self.config.origin)
                    .header("Referer", format!("{}/", self.config.origin))
                    .json(query),
            )
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Search request failed: {}", e)))?;

        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))
    }

    /// Catalog search. A failed bootstrap is logged and the search goes ahead anyway.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        if let Err(e) = self.bootstrap_session().await {
            match e.severity() {
                Severity::NonFatal => {
                    warn!("continuing search without an established session: {}", e)
                }
                Severity::Fatal => return Err(ApiError::ApiError(e.to_string())),
            }
        }
        self.post_search(query).await
    }

    /// Plain out-of-browser download, used only as the last resort for single files.
    pub async fn fetch_direct(&self, url: &str) -> Result<Bytes> {
        let response = self
            .send(
                self.http
                    .get(url)
                    .header(ACCEPT, "application/octet-stream, */*;q=0.8")
                    .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
                    .header("Referer", format!("{}/", self.config.origin)),
            )
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Direct download failed: {}", e)))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.contains("text/html") {
            return Err(ApiError::InvalidResponse(format!(
                "expected a file but got {}",
                content_type
            )));
        }

        let body = response.bytes().await?;
        debug!(url, bytes = body.len(), content_type = %content_type, "direct download finished");
        Ok(body)
    }
}
