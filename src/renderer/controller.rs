use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{scripts, GatedFetcher, GatedPayload, RendererConfig, RendererError};
use crate::domain::RendererSurfaceState;
use crate::utils::{is_binary_content_type, looks_like_html};

/// One hidden page loaded on the site origin.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Runs a script in the page and returns the value its promise resolves to.
    async fn evaluate(&self, script: String) -> Result<Value, RendererError>;

    /// False once the page or its browser has gone away.
    fn is_alive(&self) -> bool;

    async fn close(&self);
}

#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    /// Opens a hidden, unthrottled surface and returns once `url` has finished loading.
    async fn open(&self, url: &str) -> Result<Arc<dyn RenderSurface>, RendererError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptFetchResult {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Owns the process-wide rendering surface.
///
/// Creation is single-flight: the surface slot stays locked for the whole
/// launch-and-activate sequence, so callers that arrive meanwhile wait and
/// then find the surface ready. Gated fetches are serialized so that two
/// downloads never interleave their probe and payload requests.
pub struct RendererController {
    config: RendererConfig,
    launcher: Arc<dyn SurfaceLauncher>,
    surface: Mutex<Option<Arc<dyn RenderSurface>>>,
    state: StdMutex<RendererSurfaceState>,
    fetch_gate: Mutex<()>,
    creations: AtomicUsize,
}

impl RendererController {
    pub fn new(config: RendererConfig, launcher: Arc<dyn SurfaceLauncher>) -> Self {
        Self {
            config,
            launcher,
            surface: Mutex::new(None),
            state: StdMutex::new(RendererSurfaceState::Uninitialized),
            fetch_gate: Mutex::new(()),
            creations: AtomicUsize::new(0),
        }
    }

    /// Controller backed by a headless Chromium.
    pub fn chromium(config: RendererConfig) -> Self {
        let launcher = super::ChromiumLauncher::new(&config);
        Self::new(config, Arc::new(launcher))
    }

    pub fn state(&self) -> RendererSurfaceState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: RendererSurfaceState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// How many times a surface has been created.
    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    pub async fn ensure_ready(&self) -> Result<(), RendererError> {
        let mut slot = self.surface.lock().await;

        if let Some(surface) = slot.as_ref() {
            if surface.is_alive() && self.state() == RendererSurfaceState::Ready {
                return Ok(());
            }
            warn!("rendering surface was destroyed, recreating it");
            if let Some(stale) = slot.take() {
                stale.close().await;
            }
            self.set_state(RendererSurfaceState::Destroyed);
        }

        self.set_state(RendererSurfaceState::Loading);
        self.creations.fetch_add(1, Ordering::SeqCst);
        info!(origin = %self.config.origin, "opening download surface");

        let surface = match timeout(
            self.config.launch_timeout,
            self.launcher.open(&self.config.origin),
        )
        .await
        {
            Ok(Ok(surface)) => surface,
            Ok(Err(e)) => {
                self.set_state(RendererSurfaceState::Uninitialized);
                return Err(e);
            }
            Err(_) => {
                self.set_state(RendererSurfaceState::Uninitialized);
                return Err(RendererError::Unavailable(format!(
                    "surface did not load within {:?}",
                    self.config.launch_timeout
                )));
            }
        };

        match timeout(self.config.ready_watchdog, self.activate(surface.as_ref())).await {
            Ok(Ok(())) => debug!("service worker activation finished"),
            Ok(Err(e)) => warn!("service worker activation failed, continuing: {}", e),
            Err(_) => warn!(
                watchdog = ?self.config.ready_watchdog,
                "activation watchdog fired, marking surface ready anyway"
            ),
        }

        *slot = Some(surface);
        self.set_state(RendererSurfaceState::Ready);
        info!("download surface ready");
        Ok(())
    }

    async fn activate(&self, surface: &dyn RenderSurface) -> Result<(), RendererError> {
        sleep(self.config.service_worker_delay).await;

        let result = surface
            .evaluate(scripts::activate(&self.config.origin))
            .await?;
        if let Some(error) = result.get("error").and_then(|v| v.as_str()) {
            return Err(RendererError::Script(error.to_string()));
        }

        let status = result.get("status").and_then(|v| v.as_u64());
        let controlled = result.get("controlled").and_then(|v| v.as_bool());
        debug!(?status, ?controlled, "activation fetch returned");
        Ok(())
    }

    async fn live_surface(&self) -> Result<Arc<dyn RenderSurface>, RendererError> {
        let slot = self.surface.lock().await;
        slot.as_ref()
            .filter(|surface| surface.is_alive())
            .cloned()
            .ok_or_else(|| RendererError::Unavailable("no live rendering surface".to_string()))
    }

    /// Drops `surface` from the slot if it died. Returns true when it did.
    async fn discard_if_dead(&self, surface: &Arc<dyn RenderSurface>) -> bool {
        if surface.is_alive() {
            return false;
        }
        let mut slot = self.surface.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, surface)) {
            *slot = None;
            self.set_state(RendererSurfaceState::Destroyed);
        }
        true
    }

    /// Two-request gated fetch, run inside the surface.
    ///
    /// The first request only primes the gating and its response is logged and
    /// dropped. The site rejects a cold request, so collapsing this into one
    /// fetch breaks downloads.
    pub async fn fetch_gated(&self, url: &str) -> Result<GatedPayload, RendererError> {
        let _serial = self.fetch_gate.lock().await;
        let surface = self.live_surface().await?;

        let probe = timeout(self.config.fetch_timeout, surface.evaluate(scripts::probe(url)));
        match probe.await {
            Ok(Ok(meta)) => {
                let status = meta.get("status").and_then(|v| v.as_u64());
                let content_type = meta.get("contentType").and_then(|v| v.as_str());
                let error = meta.get("error").and_then(|v| v.as_str());
                debug!(url, ?status, ?content_type, ?error, "gating probe answered");
            }
            Ok(Err(e)) => {
                if self.discard_if_dead(&surface).await {
                    return Err(RendererError::Unavailable(format!(
                        "surface died during probe: {}",
                        e
                    )));
                }
                warn!(url, "gating probe failed: {}", e);
            }
            Err(_) => {
                warn!(url, timeout = ?self.config.fetch_timeout, "gating probe timed out");
                return Err(RendererError::TimedOut(self.config.fetch_timeout));
            }
        }

        sleep(self.config.probe_delay).await;

        let raw = match timeout(
            self.config.fetch_timeout,
            surface.evaluate(scripts::payload(url)),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                if self.discard_if_dead(&surface).await {
                    return Err(RendererError::Unavailable(format!(
                        "surface died during download: {}",
                        e
                    )));
                }
                return Err(e);
            }
            Err(_) => {
                warn!(url, timeout = ?self.config.fetch_timeout, "gated download timed out");
                return Err(RendererError::TimedOut(self.config.fetch_timeout));
            }
        };

        classify_payload(url, raw)
    }

    pub async fn shutdown(&self) {
        if let Some(surface) = self.surface.lock().await.take() {
            surface.close().await;
        }
        self.set_state(RendererSurfaceState::Uninitialized);
        info!(created = self.creation_count(), "download surface shut down");
    }
}

fn classify_payload(url: &str, raw: Value) -> Result<GatedPayload, RendererError> {
    let result: ScriptFetchResult = serde_json::from_value(raw)
        .map_err(|e| RendererError::Script(format!("malformed fetch result: {}", e)))?;

    if let Some(error) = result.error {
        return Err(RendererError::Script(error));
    }

    let body = base64::engine::general_purpose::STANDARD
        .decode(result.data.unwrap_or_default())?;

    if is_binary_content_type(&result.content_type) {
        info!(
            url,
            bytes = body.len(),
            content_type = %result.content_type,
            "gated fetch returned a file"
        );
        return Ok(GatedPayload {
            status: result.status,
            content_type: result.content_type,
            bytes: Bytes::from(body),
        });
    }

    let text = String::from_utf8_lossy(&body);
    warn!(
        url,
        status = result.status,
        content_type = %result.content_type,
        "gated fetch returned non-file content"
    );
    if looks_like_html(&text) {
        Err(RendererError::HtmlErrorPage {
            status: result.status,
        })
    } else {
        Err(RendererError::UnexpectedContent {
            status: result.status,
            content_type: result.content_type,
        })
    }
}

#[async_trait]
impl GatedFetcher for RendererController {
    async fn ensure_ready(&self) -> Result<(), RendererError> {
        RendererController::ensure_ready(self).await
    }

    async fn fetch(&self, url: &str) -> Result<GatedPayload, RendererError> {
        self.fetch_gated(url).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    struct FakeSurface {
        alive: AtomicBool,
        hang_on_activate: bool,
        probe_pause: Duration,
        payload_pause: Duration,
        payload: Value,
        scripts: StdMutex<Vec<&'static str>>,
    }

    impl FakeSurface {
        fn kill(&self) {
            self.alive.store(false, Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.scripts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RenderSurface for FakeSurface {
        async fn evaluate(&self, script: String) -> Result<Value, RendererError> {
            if !self.is_alive() {
                return Err(RendererError::Script("target closed".into()));
            }
            let kind = if script.starts_with(scripts::ACTIVATE_TAG) {
                "activate"
            } else if script.starts_with(scripts::PROBE_TAG) {
                "probe"
            } else {
                "payload"
            };
            self.scripts.lock().unwrap().push(kind);

            match kind {
                "activate" if self.hang_on_activate => {
                    sleep(Duration::from_secs(30)).await;
                    Ok(json!({}))
                }
                "activate" => Ok(json!({ "status": 200, "controlled": true })),
                "probe" => {
                    sleep(self.probe_pause).await;
                    Ok(json!({ "status": 200, "contentType": "text/html" }))
                }
                _ => {
                    sleep(self.payload_pause).await;
                    Ok(self.payload.clone())
                }
            }
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn close(&self) {
            self.kill();
        }
    }

    struct FakeLauncher {
        opens: AtomicUsize,
        fail: bool,
        hang_on_activate: bool,
        probe_pause: Duration,
        payload_pause: Duration,
        payload: Value,
        surfaces: StdMutex<Vec<Arc<FakeSurface>>>,
    }

    impl FakeLauncher {
        fn serving(payload: Value) -> Self {
            Self {
                opens: AtomicUsize::new(0),
                fail: false,
                hang_on_activate: false,
                probe_pause: Duration::ZERO,
                payload_pause: Duration::ZERO,
                payload,
                surfaces: StdMutex::new(Vec::new()),
            }
        }

        fn latest(&self) -> Arc<FakeSurface> {
            self.surfaces.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SurfaceLauncher for FakeLauncher {
        async fn open(&self, _url: &str) -> Result<Arc<dyn RenderSurface>, RendererError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            if self.fail {
                return Err(RendererError::Unavailable("no browser installed".into()));
            }
            let surface = Arc::new(FakeSurface {
                alive: AtomicBool::new(true),
                hang_on_activate: self.hang_on_activate,
                probe_pause: self.probe_pause,
                payload_pause: self.payload_pause,
                payload: self.payload.clone(),
                scripts: StdMutex::new(Vec::new()),
            });
            self.surfaces.lock().unwrap().push(Arc::clone(&surface));
            Ok(surface)
        }
    }

    fn fast_config() -> RendererConfig {
        RendererConfig {
            origin: "https://charts.test".into(),
            service_worker_delay: Duration::ZERO,
            ready_watchdog: Duration::from_millis(200),
            launch_timeout: Duration::from_secs(2),
            probe_delay: Duration::ZERO,
            fetch_timeout: Duration::from_secs(2),
            ..RendererConfig::default()
        }
    }

    fn zip_payload() -> Value {
        json!({
            "status": 200,
            "contentType": "application/zip",
            "size": 4,
            "data": base64::engine::general_purpose::STANDARD.encode(b"PK\x03\x04"),
        })
    }

    fn controller(launcher: &Arc<FakeLauncher>) -> RendererController {
        RendererController::new(fast_config(), Arc::clone(launcher) as Arc<dyn SurfaceLauncher>)
    }

    #[tokio::test]
    async fn concurrent_ensure_ready_creates_one_surface() {
        let launcher = Arc::new(FakeLauncher::serving(zip_payload()));
        let controller = controller(&launcher);
        assert_eq!(controller.state(), RendererSurfaceState::Uninitialized);

        let results =
            futures::future::join_all((0..8).map(|_| controller.ensure_ready())).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(launcher.opens.load(Ordering::SeqCst), 1);
        assert_eq!(controller.creation_count(), 1);
        assert_eq!(controller.state(), RendererSurfaceState::Ready);
    }

    #[tokio::test]
    async fn gated_fetch_primes_then_downloads() {
        let launcher = Arc::new(FakeLauncher::serving(zip_payload()));
        let controller = controller(&launcher);
        controller.ensure_ready().await.unwrap();

        let payload = controller
            .fetch_gated("https://charts.test/download?md5=abc")
            .await
            .unwrap();

        assert_eq!(&payload.bytes[..], b"PK\x03\x04");
        assert_eq!(payload.content_type, "application/zip");
        assert_eq!(launcher.latest().calls(), vec!["activate", "probe", "payload"]);
    }

    #[tokio::test]
    async fn html_second_response_is_rejected() {
        let html = "<!DOCTYPE html><html><body>Download unavailable</body></html>";
        let launcher = Arc::new(FakeLauncher::serving(json!({
            "status": 200,
            "contentType": "text/html; charset=utf-8",
            "data": base64::engine::general_purpose::STANDARD.encode(html),
        })));
        let controller = controller(&launcher);
        controller.ensure_ready().await.unwrap();

        let err = controller
            .fetch_gated("https://charts.test/download?md5=abc")
            .await
            .unwrap_err();
        assert!(matches!(err, RendererError::HtmlErrorPage { status: 200 }));
    }

    #[tokio::test]
    async fn script_error_is_reported() {
        let launcher = Arc::new(FakeLauncher::serving(json!({ "error": "TypeError: Failed to fetch" })));
        let controller = controller(&launcher);
        controller.ensure_ready().await.unwrap();

        let err = controller.fetch_gated("https://charts.test/x").await.unwrap_err();
        assert!(matches!(err, RendererError::Script(msg) if msg.contains("Failed to fetch")));
    }

    #[tokio::test]
    async fn watchdog_marks_ready_when_activation_hangs() {
        let launcher = Arc::new(FakeLauncher {
            hang_on_activate: true,
            ..FakeLauncher::serving(zip_payload())
        });
        let controller = controller(&launcher);

        controller.ensure_ready().await.unwrap();
        assert_eq!(controller.state(), RendererSurfaceState::Ready);
    }

    #[tokio::test]
    async fn destroyed_surface_is_recreated() {
        let launcher = Arc::new(FakeLauncher::serving(zip_payload()));
        let controller = controller(&launcher);
        controller.ensure_ready().await.unwrap();

        launcher.latest().kill();
        let err = controller.fetch_gated("https://charts.test/x").await.unwrap_err();
        assert!(matches!(err, RendererError::Unavailable(_)));

        controller.ensure_ready().await.unwrap();
        assert_eq!(launcher.opens.load(Ordering::SeqCst), 2);
        assert_eq!(controller.state(), RendererSurfaceState::Ready);
        assert!(controller.fetch_gated("https://charts.test/x").await.is_ok());
    }

    #[tokio::test]
    async fn launch_failure_leaves_controller_uninitialized() {
        let launcher = Arc::new(FakeLauncher {
            fail: true,
            ..FakeLauncher::serving(zip_payload())
        });
        let controller = controller(&launcher);

        let err = controller.ensure_ready().await.unwrap_err();
        assert!(matches!(err, RendererError::Unavailable(_)));
        assert_eq!(controller.state(), RendererSurfaceState::Uninitialized);
    }

    #[tokio::test]
    async fn shutdown_closes_the_surface() {
        let launcher = Arc::new(FakeLauncher::serving(zip_payload()));
        let controller = controller(&launcher);
        controller.ensure_ready().await.unwrap();

        controller.shutdown().await;
        assert!(!launcher.latest().is_alive());
        assert_eq!(controller.state(), RendererSurfaceState::Uninitialized);
    }

    #[tokio::test]
    async fn hung_priming_request_times_out() {
        let launcher = Arc::new(FakeLauncher {
            probe_pause: Duration::from_secs(3600),
            ..FakeLauncher::serving(zip_payload())
        });
        let controller = RendererController::new(
            RendererConfig {
                fetch_timeout: Duration::from_millis(100),
                ..fast_config()
            },
            Arc::clone(&launcher) as Arc<dyn SurfaceLauncher>,
        );
        controller.ensure_ready().await.unwrap();

        let outcome = timeout(
            Duration::from_secs(3),
            controller.fetch_gated("https://charts.test/download?md5=abc"),
        )
        .await
        .expect("gated fetch must give up on a hung priming request");

        assert!(matches!(outcome, Err(RendererError::TimedOut(_))));
        assert_eq!(launcher.latest().calls(), vec!["activate", "probe"]);
    }

    #[tokio::test]
    async fn hung_payload_times_out() {
        let launcher = Arc::new(FakeLauncher {
            payload_pause: Duration::from_secs(3600),
            ..FakeLauncher::serving(zip_payload())
        });
        let controller = RendererController::new(
            RendererConfig {
                fetch_timeout: Duration::from_millis(100),
                ..fast_config()
            },
            Arc::clone(&launcher) as Arc<dyn SurfaceLauncher>,
        );
        controller.ensure_ready().await.unwrap();

        let err = controller.fetch_gated("https://charts.test/x").await.unwrap_err();
        assert!(matches!(err, RendererError::TimedOut(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn concurrent_fetches_do_not_interleave() {
        let launcher = Arc::new(FakeLauncher {
            probe_pause: Duration::from_millis(30),
            ..FakeLauncher::serving(zip_payload())
        });
        let controller = controller(&launcher);
        controller.ensure_ready().await.unwrap();

        let (first, second) = tokio::join!(
            controller.fetch_gated("https://charts.test/a"),
            controller.fetch_gated("https://charts.test/b"),
        );

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(
            launcher.latest().calls(),
            vec!["activate", "probe", "payload", "probe", "payload"]
        );
    }
}
