mod api;
mod app;
mod application;
mod config;
mod domain;
mod logging;
mod renderer;
mod settings;
mod ui;
mod utils;

use iced::window;

fn main() -> iced::Result {
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable, using stderr: {}", e);
    }

    iced::application(app::DownloadApp::default, app::update, app::view)
        .title("Simple Chart Downloader")
        .subscription(app::subscription)
        .window(window::Settings {
            size: iced::Size::new(900.0, 700.0),
            // The download browser is shut down before the window goes away.
            exit_on_close_request: false,
            ..Default::default()
        })
        .run()
}
