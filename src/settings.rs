use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AppError, DownloadFormat};

const APP_DIR: &str = "simple-chart-downloader";
const GAME_DIR: &str = "Clone Hero";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_format: Option<DownloadFormat>,
}

/// Fields to change; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub download_directory: Option<PathBuf>,
    pub download_format: Option<DownloadFormat>,
}

/// JSON-backed user settings.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/simple-chart-downloader/settings.json`, or the working directory
    /// when the platform has no config dir.
    pub fn default_location() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR).join("settings.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<Settings, AppError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let bytes = std::fs::read(&self.path)
            .map_err(|e| AppError::Settings(format!("failed to read {}: {e}", self.path.display())))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Settings(format!(
                "failed to parse settings at {}: {e}",
                self.path.display()
            ))
        })
    }

    pub fn save(&self, patch: SettingsPatch) -> Result<Settings, AppError> {
        let mut settings = self.get()?;
        if let Some(dir) = patch.download_directory {
            settings.download_directory = Some(dir);
        }
        if let Some(format) = patch.download_format {
            settings.download_format = Some(format);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&settings)
            .map_err(|e| AppError::Settings(e.to_string()))?;
        std::fs::write(&self.path, format!("{json}\n"))?;
        Ok(settings)
    }
}

/// Song folders configured in the game's own `settings.ini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    pub settings_path: PathBuf,
    pub song_directories: Vec<String>,
}

fn candidate_game_dirs() -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();
    if let Some(home) = dirs::home_dir() {
        dirs_found.push(home.join("Library/Application Support").join(GAME_DIR));
        dirs_found.push(home.join(".config").join(GAME_DIR));
    }
    if let Some(config) = dirs::config_dir() {
        dirs_found.push(config.join(GAME_DIR));
    }
    if let Some(documents) = dirs::document_dir() {
        dirs_found.push(documents.join(GAME_DIR));
    }
    dirs_found.dedup();
    dirs_found
}

/// Looks for an installed game and reads its song folders.
pub fn detect_installed_game_settings() -> Option<GameSettings> {
    detect_in(&candidate_game_dirs())
}

fn detect_in(candidates: &[PathBuf]) -> Option<GameSettings> {
    candidates.iter().find_map(|dir| {
        let settings_file = dir.join("settings.ini");
        let content = std::fs::read_to_string(&settings_file).ok()?;
        let song_directories = parse_song_folders(&content)?;
        debug!(path = %settings_file.display(), "found game settings");
        Some(GameSettings {
            settings_path: dir.clone(),
            song_directories,
        })
    })
}

/// Parses `SongFolders = a;b;c`, dropping empty items.
pub fn parse_song_folders(content: &str) -> Option<Vec<String>> {
    let re = Regex::new(r"SongFolders\s*=\s*(.+)").ok()?;
    let caps = re.captures(content)?;
    Some(
        caps[1]
            .trim()
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
