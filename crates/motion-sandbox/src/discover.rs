//! Convention-based output discovery
//!
//! The renderer does not report where it wrote the artifact. The expected
//! directory is computed from the media root, the job id (module name) and
//! the quality preset, then scanned for files with the media extension.
//! Multiple matches resolve to the lexicographically first file name.

use crate::error::RenderError;
use crate::quality::RenderQuality;
use motion_ledger::JobId;
use std::path::{Path, PathBuf};

/// `<media_dir>/videos/<job_id>/<resolution>`
#[must_use]
pub fn expected_output_dir(media_dir: &Path, job_id: &JobId, quality: RenderQuality) -> PathBuf {
    media_dir
        .join("videos")
        .join(job_id.as_str())
        .join(quality.dir_name())
}

/// Locate the rendered artifact
///
/// # Errors
/// - `NoOutput` if the directory is missing or holds no matching file
/// - `Io` on other read failures
pub async fn discover_output(
    media_dir: &Path,
    job_id: &JobId,
    quality: RenderQuality,
    extension: &str,
) -> Result<PathBuf, RenderError> {
    let dir = expected_output_dir(media_dir, job_id, quality);

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RenderError::NoOutput { searched: dir });
        }
        Err(e) => return Err(e.into()),
    };

    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let has_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if has_extension {
            matches.push(path);
        }
    }

    matches.sort();
    if matches.len() > 1 {
        tracing::warn!(
            "Found {} candidate outputs in {}, using {}",
            matches.len(),
            dir.display(),
            matches[0].display()
        );
    }

    matches
        .into_iter()
        .next()
        .ok_or(RenderError::NoOutput { searched: dir })
}
