use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::models::SearchQuery;
use crate::domain::AppError;

impl ApiClient {
    /// Runs the landing-page and double-search handshake once per process.
    ///
    /// Every step is best effort. Whatever cookies were captured stay in the
    /// session even when this returns [`AppError::BootstrapFailed`], and a
    /// failed run is retried on the next call.
    pub async fn bootstrap_session(&self) -> Result<(), AppError> {
        if self.session().is_established() {
            return Ok(());
        }

        let _gate = self.session().bootstrap_gate.lock().await;
        if self.session().is_established() {
            return Ok(());
        }

        info!("bootstrapping site session");
        let config = self.config().clone();
        let mut failures = Vec::new();

        match self.get_document(&format!("{}/", config.origin)).await {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "landing page loaded");
            }
            Ok(response) => failures.push(format!("landing page returned {}", response.status())),
            Err(e) => failures.push(format!("landing page: {}", e)),
        }

        tokio::time::sleep(config.bootstrap_initial_delay).await;

        let probe = SearchQuery::new(config.bootstrap_query.clone(), 1);
        if let Err(e) = self.post_search(&probe).await {
            failures.push(format!("first search probe: {}", e));
        }

        tokio::time::sleep(config.bootstrap_probe_delay).await;

        // The site only unlocks downloads after two completed searches.
        if let Err(e) = self.post_search(&probe).await {
            failures.push(format!("second search probe: {}", e));
        }

        if failures.is_empty() {
            self.session().mark_established();
            info!(
                cookies = self.session().snapshot().cookies().len(),
                "site session established"
            );
            Ok(())
        } else {
            for failure in &failures {
                warn!("bootstrap step failed: {}", failure);
            }
            Err(AppError::BootstrapFailed(failures.join("; ")))
        }
    }
}
