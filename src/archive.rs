// src/archive.rs

use chrono::NaiveDateTime;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

use crate::error::PipelineError;

/// `<stem>_<YYYYMMDD>T<HHMMSS>.<ext>`, extension omitted when the input has none.
pub fn dated_name(file: &Path, at: NaiveDateTime) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    let stamp = at.format("%Y%m%dT%H%M%S");
    match file.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    }
}

/// Finish a successful dataset run: move `staging` into `archive_dir` under
/// a dated name and remove `source`. Returns the archived path.
#[instrument(level = "info", skip_all, fields(staging = %staging.display()))]
pub fn archive_output(
    staging: &Path,
    source: &Path,
    archive_dir: &Path,
    at: NaiveDateTime,
) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(archive_dir).map_err(|e| PipelineError::io(archive_dir, e))?;

    let name = dated_name(staging, at);
    let mut dest = archive_dir.join(&name);
    let mut n = 1;
    while dest.exists() {
        let alt = Path::new(&name);
        let stem = alt.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        dest = archive_dir.join(match alt.extension() {
            Some(ext) => format!("{stem}_{n}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{n}"),
        });
        n += 1;
    }

    move_file(staging, &dest)?;

    if source != staging && source.exists() {
        fs::remove_file(source).map_err(|e| PipelineError::io(source, e))?;
        debug!(source = %source.display(), "removed source");
    }

    info!(archived = %dest.display(), "archived staging output");
    Ok(dest)
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|e| PipelineError::io(from, e))?;
    fs::remove_file(from).map_err(|e| PipelineError::io(from, e))
}
