pub mod error;
pub mod model;

pub use error::{AppError, ErrorKind, Severity};
pub use model::{
    DownloadFormat, DownloadPhase, DownloadRequest, DownloadResult, RendererSurfaceState,
};
