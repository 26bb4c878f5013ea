use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::controller::{RenderSurface, SurfaceLauncher};
use super::{RendererConfig, RendererError};

/// Launches a headless Chromium over CDP. The window is never shown.
pub struct ChromiumLauncher {
    chrome_path: Option<PathBuf>,
    user_agent: Option<String>,
}

impl ChromiumLauncher {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

fn cdp_error(context: &str, e: impl std::fmt::Display) -> RendererError {
    RendererError::Unavailable(format!("{}: {}", context, e))
}

#[async_trait]
impl SurfaceLauncher for ChromiumLauncher {
    async fn open(&self, url: &str) -> Result<Arc<dyn RenderSurface>, RendererError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            // Keep timers and the service worker running while nothing is visible.
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--mute-audio");

        if let Some(ref chrome_path) = self.chrome_path {
            builder = builder.chrome_executable(chrome_path);
        }

        let config = builder
            .build()
            .map_err(|e| cdp_error("failed to build browser config", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| cdp_error("failed to launch browser", e))?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = Arc::clone(&alive);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            debug!("browser connection closed");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| cdp_error("failed to open page", e))?;

        if let Some(ref user_agent) = self.user_agent {
            page.execute(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
                .map_err(|e| cdp_error("failed to set user agent", e))?;
        }

        info!(url, "loading site in download surface");
        page.goto(url)
            .await
            .map_err(|e| cdp_error("failed to load site", e))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| cdp_error("site never finished loading", e))?;

        Ok(Arc::new(ChromiumSurface {
            browser: Mutex::new(Some(browser)),
            page,
            alive,
            handler_task,
        }))
    }
}

struct ChromiumSurface {
    browser: Mutex<Option<Browser>>,
    page: Page,
    alive: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn evaluate(&self, script: String) -> Result<Value, RendererError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| RendererError::Script(e.to_string()))?;
        result
            .into_value::<Value>()
            .map_err(|e| RendererError::Script(format!("unreadable script result: {e}")))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                debug!("browser did not close cleanly: {e}");
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        self.handler_task.abort();
    }
}

impl Drop for ChromiumSurface {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
