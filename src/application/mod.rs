pub mod archive;
pub mod download_coordinator;

pub use archive::ArchiveNormalizer;
pub use download_coordinator::DownloadCoordinator;
