use std::path::{Path, PathBuf};
use std::sync::Arc;

use iced::{window, Subscription, Task};
use tracing::{error, info, warn};

use crate::api::{ApiClient, SearchQuery, SearchResponse};
use crate::application::{ArchiveNormalizer, DownloadCoordinator};
use crate::config::AppConfig;
use crate::domain::{AppError, DownloadPhase, DownloadRequest, DownloadResult};
use crate::renderer::RendererController;
use crate::settings::{self, GameSettings, SettingsPatch, SettingsStore};
use crate::ui::{DownloadMessage, DownloadView};

pub struct DownloadApp {
    view: DownloadView,
    coordinator: Option<DownloadCoordinator>,
    renderer: Option<Arc<RendererController>>,
    settings: SettingsStore,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new(AppConfig::from_env(), SettingsStore::default_location())
    }
}

impl DownloadApp {
    pub fn new(config: AppConfig, settings: SettingsStore) -> Self {
        let mut view = DownloadView::default();

        match settings.get() {
            Ok(saved) => {
                view.destination = saved.download_directory;
                view.format = saved.download_format.unwrap_or_default();
            }
            Err(e) => warn!("ignoring unreadable settings: {}", e),
        }

        let (coordinator, renderer) = match ApiClient::new(config.site) {
            Ok(api_client) => {
                let renderer = Arc::new(RendererController::chromium(config.renderer));
                let coordinator = DownloadCoordinator::new(
                    api_client,
                    renderer.clone(),
                    ArchiveNormalizer::default(),
                );
                (Some(coordinator), Some(renderer))
            }
            Err(e) => {
                error!("failed to build HTTP client: {}", e);
                view.status_message = format!("Network unavailable: {}", e);
                (None, None)
            }
        };

        Self {
            view,
            coordinator,
            renderer,
            settings,
        }
    }

    fn remember(&self, patch: SettingsPatch) {
        if let Err(e) = self.settings.save(patch) {
            warn!(path = %self.settings.path().display(), "failed to save settings: {}", e);
        }
    }

    fn start_search(&mut self, page: u32) -> Task<Message> {
        let query = self.view.query.trim().to_string();
        if query.is_empty() || self.view.is_busy() {
            return Task::none();
        }
        let Some(coordinator) = self.coordinator.clone() else {
            return Task::none();
        };

        self.view.page = page;
        self.view.phase = DownloadPhase::Searching;
        self.view.status_message = format!("Searching for \"{}\"...", query);
        let search = SearchQuery::new(query, page)
            .with_filters(self.view.instrument, self.view.difficulty);

        Task::perform(
            async move { coordinator.search(search).await },
            Message::SearchCompleted,
        )
    }

    fn reveal_last_saved(&mut self) {
        let Some(path) = self.view.last_saved.as_deref() else {
            return;
        };
        let target = reveal_target(path);
        if let Err(e) = open::that_detached(&target) {
            warn!(path = %target.display(), "failed to open file manager: {}", e);
            self.view.status_message = format!("Could not open {}: {}", target.display(), e);
        }
    }

    fn start_download(&mut self, index: usize) -> Task<Message> {
        if self.view.is_busy() {
            return Task::none();
        }
        let Some(coordinator) = self.coordinator.clone() else {
            return Task::none();
        };
        let Some(entry) = self.view.results.get(index).cloned() else {
            return Task::none();
        };
        let Some(destination_dir) = self.view.destination.clone() else {
            self.view.status_message = "Choose a songs folder first".to_string();
            return Task::none();
        };

        let title = format!("{} - {}", entry.artist, entry.title);
        self.view.phase = DownloadPhase::Downloading;
        self.view.status_message = format!("Downloading {} ({})...", title, self.view.format);

        let request = DownloadRequest {
            entry,
            format: self.view.format,
            destination_dir,
        };

        Task::perform(
            async move { coordinator.download(request).await },
            move |result| Message::DownloadCompleted(title.clone(), result),
        )
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    SearchCompleted(Result<SearchResponse, AppError>),
    /// (Chart title, final path or failure)
    DownloadCompleted(String, Result<PathBuf, AppError>),
    FolderSelected(Option<PathBuf>),
    GameSettingsDetected(Option<GameSettings>),
    CloseRequested(window::Id),
    ShutdownFinished,
}

/// Folder to show for a saved chart: the chart folder itself, or the folder holding a single file.
fn reveal_target(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}

pub fn subscription(_app: &DownloadApp) -> Subscription<Message> {
    window::close_requests().map(Message::CloseRequested)
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            let target_page = app.view.target_page(&ui_msg);
            app.view.update(ui_msg.clone());

            if let Some(page) = target_page {
                return app.start_search(page);
            }

            match ui_msg {
                DownloadMessage::OpenFolderPressed => app.reveal_last_saved(),
                DownloadMessage::DownloadPressed(index) => {
                    return app.start_download(index);
                }
                DownloadMessage::FormatSelected(format) => {
                    app.remember(SettingsPatch {
                        download_format: Some(format),
                        ..Default::default()
                    });
                }
                DownloadMessage::ChooseFolderPressed => {
                    return Task::perform(
                        async {
                            rfd::AsyncFileDialog::new()
                                .set_title("Select your songs folder")
                                .pick_folder()
                                .await
                                .map(|handle| handle.path().to_path_buf())
                        },
                        Message::FolderSelected,
                    );
                }
                DownloadMessage::DetectGamePressed => {
                    return Task::perform(
                        async { settings::detect_installed_game_settings() },
                        Message::GameSettingsDetected,
                    );
                }
                DownloadMessage::SearchPressed
                | DownloadMessage::NextPage
                | DownloadMessage::PreviousPage
                | DownloadMessage::QueryChanged(_)
                | DownloadMessage::InstrumentCycled
                | DownloadMessage::DifficultyCycled => {}
            }
        }
        Message::SearchCompleted(result) => match result {
            Ok(response) => {
                app.view.phase = DownloadPhase::Idle;
                app.view.found = response.found;
                app.view.status_message = if response.data.is_empty() {
                    "No charts found".to_string()
                } else {
                    format!("Found {} charts", response.found)
                };
                app.view.results = response.data;
            }
            Err(e) => {
                app.view.phase = DownloadPhase::Failed;
                app.view.status_message = format!("Search failed: {}", e);
            }
        },
        Message::DownloadCompleted(title, result) => {
            let outcome = DownloadResult::from(&result);
            if outcome.success {
                app.view.phase = DownloadPhase::Completed;
                match outcome.final_path {
                    Some(path) => {
                        info!(path = %path.display(), "downloaded {}", title);
                        app.view.status_message = format!("Saved: {}", path.display());
                        app.view.last_saved = Some(path);
                    }
                    None => app.view.status_message = format!("Saved {}", title),
                }
            } else {
                let reason = result.err().map(|e| e.to_string()).unwrap_or_default();
                warn!(kind = ?outcome.error_kind, "download of {} failed: {}", title, reason);
                app.view.phase = DownloadPhase::Failed;
                app.view.status_message = format!("Download failed: {}", reason);
            }
        }
        Message::FolderSelected(Some(path)) => {
            app.view.status_message = format!("Songs folder set to {}", path.display());
            app.remember(SettingsPatch {
                download_directory: Some(path.clone()),
                ..Default::default()
            });
            app.view.destination = Some(path);
        }
        Message::FolderSelected(None) => {
            app.view.status_message = "Folder selection cancelled".to_string();
        }
        Message::GameSettingsDetected(found) => {
            let first_folder = found.and_then(|game| {
                info!(path = %game.settings_path.display(), "found Clone Hero settings");
                game.song_directories.into_iter().next()
            });
            match first_folder {
                Some(dir) => {
                    let path = PathBuf::from(dir);
                    app.view.status_message =
                        format!("Using Clone Hero songs folder {}", path.display());
                    app.remember(SettingsPatch {
                        download_directory: Some(path.clone()),
                        ..Default::default()
                    });
                    app.view.destination = Some(path);
                }
                None => {
                    app.view.status_message =
                        "No Clone Hero installation with song folders found".to_string();
                }
            }
        }
        Message::CloseRequested(id) => {
            let Some(renderer) = app.renderer.take() else {
                return window::close(id);
            };
            app.view.status_message = "Closing the download browser...".to_string();
            return Task::perform(
                async move { renderer.shutdown().await },
                |_| Message::ShutdownFinished,
            )
            .chain(window::close(id));
        }
        Message::ShutdownFinished => {
            info!("download browser closed");
        }
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}
