//! Offscreen browser surface used to reach downloads that only a loaded
//! page of the site can fetch.
//!
//! The site hands out real files only to requests issued from inside one
//! of its own pages, once its service worker is active. A plain HTTP client
//! gets a placeholder page instead, so downloads go through
//! [`RendererController`], which keeps one hidden page loaded on the origin
//! and runs `fetch()` inside it.

mod chromium;
mod controller;
mod scripts;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use chromium::ChromiumLauncher;
pub use controller::RendererController;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("rendering surface unavailable: {0}")]
    Unavailable(String),

    #[error("server answered with an HTML error page (HTTP {status})")]
    HtmlErrorPage { status: u16 },

    #[error("unexpected content type {content_type:?} (HTTP {status})")]
    UnexpectedContent { status: u16, content_type: String },

    #[error("script failed inside the surface: {0}")]
    Script(String),

    #[error("gated fetch timed out after {0:?}")]
    TimedOut(Duration),

    #[error("could not decode payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Binary body returned by a successful gated fetch.
#[derive(Debug, Clone)]
pub struct GatedPayload {
    pub status: u16,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Retrieves files that sit behind the site's in-page download gating.
#[async_trait]
pub trait GatedFetcher: Send + Sync {
    async fn ensure_ready(&self) -> Result<(), RendererError>;

    async fn fetch(&self, url: &str) -> Result<GatedPayload, RendererError>;
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Page loaded into the surface; its service worker does the gating.
    pub origin: String,
    pub user_agent: Option<String>,
    pub chrome_path: Option<PathBuf>,
    /// Pause after load so the service worker can register and activate.
    pub service_worker_delay: Duration,
    /// Upper bound on activation; the surface is marked ready when it fires.
    pub ready_watchdog: Duration,
    pub launch_timeout: Duration,
    /// Pause between the priming request and the real one.
    pub probe_delay: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            origin: "https://www.enchor.us".to_string(),
            user_agent: None,
            chrome_path: None,
            service_worker_delay: Duration::from_secs(3),
            ready_watchdog: Duration::from_secs(15),
            launch_timeout: Duration::from_secs(60),
            probe_delay: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(180),
        }
    }
}
