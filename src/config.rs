use std::path::PathBuf;

use crate::api::SiteConfig;
use crate::renderer::RendererConfig;

pub const ORIGIN_ENV: &str = "CHART_DOWNLOADER_ORIGIN";
pub const CHROME_ENV: &str = "CHART_DOWNLOADER_CHROME";

/// Runtime configuration: site endpoints plus download-surface tuning.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub renderer: RendererConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(ORIGIN_ENV).ok(),
            std::env::var(CHROME_ENV).ok(),
        )
    }

    fn from_vars(origin: Option<String>, chrome: Option<String>) -> Self {
        let site = match origin.as_deref().map(str::trim) {
            Some(origin) if !origin.is_empty() => SiteConfig::for_origin(origin),
            _ => SiteConfig::default(),
        };

        let renderer = RendererConfig {
            origin: site.origin.clone(),
            user_agent: Some(site.user_agent.clone()),
            chrome_path: chrome
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            ..RendererConfig::default()
        };

        Self { site, renderer }
    }
}
