//! Upload intake: validate an uploaded file name, stage the bytes on disk for
//! the pipeline, and remove the staged file on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use thiserror::Error;
use time::format_description::FormatItem;
use time::macros::format_description;
use tracing::{debug, warn};

use crate::app_dirs;
use crate::logging::now_local_or_utc;
use crate::pipeline::{AnalysisError, AnalysisReport, Pipeline};

/// Image extensions accepted for upload (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];

const STAGED_PREFIX: &str = "prostascan";
const STAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

/// Upload rejected before or while staging.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("No file was provided")]
    MissingFile,
    #[error("Unsupported file type '{filename}'; allowed: png, jpg, jpeg, gif, bmp")]
    UnsupportedFormat { filename: String },
    #[error("Failed to prepare upload directory: {0}")]
    UploadDir(#[from] app_dirs::AppDirError),
    #[error("Failed to stage upload in {path}: {source}")]
    Stage {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failure of a full upload request.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl UploadError {
    /// HTTP status an outer boundary should map this failure to.
    pub fn http_status(&self) -> u16 {
        match self {
            UploadError::Intake(
                IntakeError::MissingFile | IntakeError::UnsupportedFormat { .. },
            ) => 400,
            UploadError::Intake(_) => 500,
            UploadError::Analysis(err) => err.http_status(),
        }
    }
}

/// Whether `filename` carries an allowed image extension.
pub fn is_allowed_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Uploaded bytes written to a temporary file; deleted when dropped.
#[derive(Debug)]
pub struct StagedUpload {
    path: Option<TempPath>,
}

impl StagedUpload {
    /// Validate `filename` and write `bytes` into `dir`.
    pub fn stage(dir: &Path, filename: &str, bytes: &[u8]) -> Result<Self, IntakeError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(IntakeError::MissingFile);
        }
        if !is_allowed_file(filename) {
            return Err(IntakeError::UnsupportedFormat {
                filename: filename.to_string(),
            });
        }
        app_dirs::ensure_dir(dir.to_path_buf())?;

        let stage_err = |source| IntakeError::Stage {
            path: dir.to_path_buf(),
            source,
        };
        let stamp = now_local_or_utc()
            .format(STAMP_FORMAT)
            .unwrap_or_else(|_| "00000000_000000".to_string());
        let prefix = format!("{STAGED_PREFIX}_{stamp}_");
        let suffix = format!("_{}", sanitized_file_name(filename));
        let mut file = Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(6)
            .tempfile_in(dir)
            .map_err(stage_err)?;
        file.write_all(bytes).map_err(stage_err)?;
        file.flush().map_err(stage_err)?;
        let path = file.into_temp_path();
        debug!("Staged {} byte upload at {}", bytes.len(), path.display());
        Ok(Self { path: Some(path) })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        let shown = path.display().to_string();
        match path.close() {
            Ok(()) => debug!(path = %shown, "Removed staged upload"),
            Err(err) => warn!(path = %shown, "Failed to remove staged upload: {err}"),
        }
    }
}

/// Stage an upload, analyse it, and clean up regardless of the outcome.
pub fn analyze_upload(
    pipeline: &Pipeline,
    dir: &Path,
    filename: &str,
    bytes: &[u8],
) -> Result<AnalysisReport, UploadError> {
    let staged = StagedUpload::stage(dir, filename, bytes)?;
    Ok(pipeline.analyze(staged.path())?)
}

fn sanitized_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .unwrap_or(name);
    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        cleaned = "upload".to_string();
    }
    cleaned
}
