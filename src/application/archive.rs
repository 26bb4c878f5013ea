use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::domain::AppError;

const SCRATCH_PREFIX: &str = "chart-download-";

/// Unpacks chart archives into the songs folder.
///
/// Archives that wrap everything in one top-level folder are flattened so
/// the chart lands at `dest/<that folder>`; anything else goes under
/// `dest/<fallback name>`.
#[derive(Debug, Clone)]
pub struct ArchiveNormalizer {
    scratch_root: PathBuf,
}

impl Default for ArchiveNormalizer {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl ArchiveNormalizer {
    /// Scratch directories are created (and removed) under `scratch_root`.
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            scratch_root: scratch_root.into(),
        }
    }

    /// Extracts `archive` into `destination_dir` and returns the chart folder.
    pub async fn install(
        &self,
        archive: Bytes,
        destination_dir: &Path,
        fallback_name: &str,
    ) -> Result<PathBuf, AppError> {
        let this = self.clone();
        let destination_dir = destination_dir.to_path_buf();
        let fallback_name = fallback_name.to_string();

        tokio::task::spawn_blocking(move || {
            this.install_blocking(&archive, &destination_dir, &fallback_name)
        })
        .await
        .map_err(|e| AppError::ExtractionFailed(format!("extraction task failed: {}", e)))?
    }

    pub fn install_blocking(
        &self,
        archive: &[u8],
        destination_dir: &Path,
        fallback_name: &str,
    ) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.scratch_root)?;

        let result = unpack_and_place(&scratch, archive, destination_dir, fallback_name);

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(path = %scratch_path.display(), "failed to remove scratch directory: {}", e);
        }

        result
    }
}

fn unpack_and_place(
    scratch: &TempDir,
    archive: &[u8],
    destination_dir: &Path,
    fallback_name: &str,
) -> Result<PathBuf, AppError> {
    let archive_path = scratch.path().join("payload.zip");
    fs::write(&archive_path, archive)?;

    let extract_dir = scratch.path().join("extracted");
    fs::create_dir_all(&extract_dir)?;
    extract_zip(&archive_path, &extract_dir)?;

    let (payload_root, folder_name) = payload_root(&extract_dir, fallback_name)?;
    debug!(
        root = %payload_root.display(),
        folder = %folder_name,
        "resolved archive payload root"
    );

    let final_dir = destination_dir.join(&folder_name);
    copy_dir_contents(&payload_root, &final_dir)?;

    let final_dir = std::path::absolute(&final_dir).unwrap_or(final_dir);
    info!(path = %final_dir.display(), "chart installed");
    Ok(final_dir)
}

fn extract_zip(archive_path: &Path, target: &Path) -> Result<(), AppError> {
    let reader = BufReader::new(File::open(archive_path)?);
    let mut zip = zip::ZipArchive::new(reader)
        .map_err(|e| AppError::ExtractionFailed(e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| AppError::ExtractionFailed(e.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                warn!(name = entry.name(), "skipping archive entry with unsafe path");
                continue;
            }
        };

        let output_path = target.join(&entry_path);
        if entry.is_dir() {
            fs::create_dir_all(&output_path)?;
        } else {
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&output_path)?;
            io::copy(&mut entry, &mut outfile)
                .map_err(|e| AppError::ExtractionFailed(format!("{}: {}", entry_path.display(), e)))?;
        }
    }
    Ok(())
}

/// A lone top-level directory becomes the payload root and names the final folder.
fn payload_root(extract_dir: &Path, fallback_name: &str) -> Result<(PathBuf, String), AppError> {
    let entries = fs::read_dir(extract_dir)?.collect::<Result<Vec<_>, _>>()?;

    if let [only] = entries.as_slice() {
        if only.file_type()?.is_dir() {
            let name = only.file_name().to_string_lossy().into_owned();
            return Ok((only.path(), name));
        }
    }

    Ok((extract_dir.to_path_buf(), fallback_name.to_string()))
}

/// Copies the contents of `from` into `to`, replacing files that already exist.
fn copy_dir_contents(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_contents(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
