use std::path::PathBuf;

use iced::{
    widget::{button, column, row, scrollable, text, text_input, Column, Space},
    Element, Length,
};

use crate::api::{CatalogEntry, Difficulty, Instrument};
use crate::domain::{DownloadFormat, DownloadPhase};

/// Results per page returned by the search endpoint.
const RESULTS_PER_PAGE: u64 = 25;

/// Main view state
pub struct DownloadView {
    pub query: String,
    pub page: u32,
    pub found: u64,
    pub results: Vec<CatalogEntry>,
    pub instrument: Option<Instrument>,
    pub difficulty: Option<Difficulty>,
    pub format: DownloadFormat,
    pub destination: Option<PathBuf>,
    /// Where the last successful download landed.
    pub last_saved: Option<PathBuf>,
    pub status_message: String,
    pub phase: DownloadPhase,
}

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 1,
            found: 0,
            results: Vec::new(),
            instrument: None,
            difficulty: None,
            format: DownloadFormat::default(),
            destination: None,
            last_saved: None,
            status_message: "Search for a song to download".to_string(),
            phase: DownloadPhase::Idle,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    QueryChanged(String),
    SearchPressed,
    PreviousPage,
    NextPage,
    InstrumentCycled,
    DifficultyCycled,
    FormatSelected(DownloadFormat),
    ChooseFolderPressed,
    OpenFolderPressed,
    DetectGamePressed,
    DownloadPressed(usize),
}

impl DownloadView {
    pub fn is_busy(&self) -> bool {
        matches!(
            self.phase,
            DownloadPhase::Searching | DownloadPhase::Downloading
        )
    }

    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::QueryChanged(query) => {
                self.query = query;
            }
            DownloadMessage::FormatSelected(format) => {
                self.format = format;
            }
            DownloadMessage::InstrumentCycled => {
                self.instrument = next_option(&Instrument::ALL, self.instrument);
            }
            DownloadMessage::DifficultyCycled => {
                self.difficulty = next_option(&Difficulty::ALL, self.difficulty);
            }
            DownloadMessage::SearchPressed
            | DownloadMessage::PreviousPage
            | DownloadMessage::NextPage
            | DownloadMessage::OpenFolderPressed
            | DownloadMessage::ChooseFolderPressed
            | DownloadMessage::DetectGamePressed
            | DownloadMessage::DownloadPressed(_) => {
                // Will be handled by the app
            }
        }
    }

    /// Page a search triggered by `message` would load. The view keeps its
    /// current page until that search actually starts.
    pub fn target_page(&self, message: &DownloadMessage) -> Option<u32> {
        match message {
            DownloadMessage::SearchPressed => Some(1),
            DownloadMessage::NextPage => Some(self.page + 1),
            DownloadMessage::PreviousPage => Some(self.page.saturating_sub(1).max(1)),
            _ => None,
        }
    }

    fn has_next_page(&self) -> bool {
        let shown = u64::from(self.page.saturating_sub(1)) * RESULTS_PER_PAGE
            + self.results.len() as u64;
        !self.results.is_empty() && shown < self.found
    }

    fn result_row(&self, index: usize, entry: &CatalogEntry) -> Element<'_, DownloadMessage> {
        let can_download = !self.is_busy() && self.destination.is_some();
        row![
            text(format!("{} - {}", entry.artist, entry.title))
                .size(16)
                .width(Length::Fill),
            text(format!("charted by {}", entry.charter)).size(14),
            button("Download")
                .on_press_maybe(can_download.then_some(DownloadMessage::DownloadPressed(index)))
                .padding([6, 14]),
        ]
        .spacing(10)
        .into()
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let folder_label = match &self.destination {
            Some(dir) => format!("Songs folder: {}", dir.display()),
            None => "Songs folder: not set".to_string(),
        };

        let format_button = |format: DownloadFormat| {
            let label = if self.format == format {
                format!("[{}]", format)
            } else {
                format.to_string()
            };
            button(text(label))
                .on_press(DownloadMessage::FormatSelected(format))
                .padding([6, 14])
        };

        let results = Column::with_children(
            self.results
                .iter()
                .enumerate()
                .map(|(index, entry)| self.result_row(index, entry)),
        )
        .spacing(8);

        let idle = !self.is_busy();

        let instrument_label = match self.instrument {
            Some(instrument) => format!("Instrument: {}", instrument),
            None => "Instrument: Any".to_string(),
        };
        let difficulty_label = match self.difficulty {
            Some(difficulty) => format!("Difficulty: {}", difficulty),
            None => "Difficulty: Any".to_string(),
        };

        column![
            text("Chart Downloader").size(32),
            Space::new().height(Length::Fixed(10.0)),
            row![
                text_input("Search songs, artists, charters...", &self.query)
                    .on_input(DownloadMessage::QueryChanged)
                    .on_submit(DownloadMessage::SearchPressed)
                    .padding(10),
                button("Search")
                    .on_press_maybe(idle.then_some(DownloadMessage::SearchPressed))
                    .padding([10, 20]),
            ]
            .spacing(10),
            row![
                button(text(instrument_label))
                    .on_press(DownloadMessage::InstrumentCycled)
                    .padding([6, 14]),
                button(text(difficulty_label))
                    .on_press(DownloadMessage::DifficultyCycled)
                    .padding([6, 14]),
            ]
            .spacing(10),
            row![
                format_button(DownloadFormat::Archive),
                format_button(DownloadFormat::SingleFile),
                button("Choose folder")
                    .on_press(DownloadMessage::ChooseFolderPressed)
                    .padding([6, 14]),
                button("Detect Clone Hero")
                    .on_press(DownloadMessage::DetectGamePressed)
                    .padding([6, 14]),
            ]
            .spacing(10),
            text(folder_label).size(14),
            scrollable(results).height(Length::Fill),
            row![
                button("Previous").on_press_maybe(
                    (idle && self.page > 1).then_some(DownloadMessage::PreviousPage)
                ),
                text(format!("Page {} ({} results)", self.page, self.found)).size(14),
                button("Next").on_press_maybe(
                    (idle && self.has_next_page()).then_some(DownloadMessage::NextPage)
                ),
            ]
            .spacing(10),
            row![
                text(&self.status_message).size(14).width(Length::Fill),
                button("Open folder").on_press_maybe(
                    self.last_saved
                        .is_some()
                        .then_some(DownloadMessage::OpenFolderPressed)
                ),
            ]
            .spacing(10),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}

/// Steps through `options` and then back to `None` ("any").
fn next_option<T: Copy + PartialEq>(options: &[T], current: Option<T>) -> Option<T> {
    match current {
        None => options.first().copied(),
        Some(value) => options
            .iter()
            .position(|o| *o == value)
            .and_then(|i| options.get(i + 1))
            .copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_page_never_goes_below_one() {
        let mut view = DownloadView::default();
        assert_eq!(view.target_page(&DownloadMessage::PreviousPage), Some(1));
        assert_eq!(view.target_page(&DownloadMessage::NextPage), Some(2));
        view.page = 3;
        assert_eq!(view.target_page(&DownloadMessage::SearchPressed), Some(1));
        assert_eq!(view.target_page(&DownloadMessage::PreviousPage), Some(2));
        assert_eq!(view.target_page(&DownloadMessage::DetectGamePressed), None);
    }

    #[test]
    fn paging_messages_leave_the_page_alone() {
        let mut view = DownloadView {
            page: 2,
            ..Default::default()
        };
        view.update(DownloadMessage::NextPage);
        view.update(DownloadMessage::PreviousPage);
        view.update(DownloadMessage::SearchPressed);
        assert_eq!(view.page, 2);
    }

    #[test]
    fn filters_cycle_back_to_any() {
        let mut view = DownloadView::default();
        view.update(DownloadMessage::DifficultyCycled);
        assert_eq!(view.difficulty, Some(Difficulty::Expert));
        for _ in 1..Difficulty::ALL.len() {
            view.update(DownloadMessage::DifficultyCycled);
        }
        assert_eq!(view.difficulty, Some(Difficulty::Easy));
        view.update(DownloadMessage::DifficultyCycled);
        assert_eq!(view.difficulty, None);

        view.update(DownloadMessage::InstrumentCycled);
        view.update(DownloadMessage::InstrumentCycled);
        assert_eq!(view.instrument, Some(Instrument::GuitarCoop));
    }

    #[test]
    fn next_page_depends_on_remaining_results() {
        let mut view = DownloadView {
            found: 30,
            results: vec![CatalogEntry::default(); RESULTS_PER_PAGE as usize],
            ..Default::default()
        };
        assert!(view.has_next_page());
        view.page = 2;
        view.results.truncate(5);
        assert!(!view.has_next_page());
    }
}
