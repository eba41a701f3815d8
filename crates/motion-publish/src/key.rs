//! Owner-namespaced object keys

use crate::error::PublishError;
use motion_ledger::{JobId, OwnerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Storage key `<owner_id>/<job_id>/<filename>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Build key for an artifact file name
    ///
    /// Characters outside `[A-Za-z0-9._-]` in the file name are replaced
    /// with `_`.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the file name is empty or only dots
    pub fn new(owner_id: &OwnerId, job_id: &JobId, filename: &str) -> Result<Self, PublishError> {
        let clean: String = filename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if clean.trim_matches('.').is_empty() {
            return Err(PublishError::InvalidKey(format!("unusable file name {filename:?}")));
        }
        Ok(Self(format!("{owner_id}/{job_id}/{clean}")))
    }

    /// Key for a local artifact path
    ///
    /// # Errors
    /// Returns `InvalidKey` if the path has no file name
    pub fn for_artifact(owner_id: &OwnerId, job_id: &JobId, artifact: &Path) -> Result<Self, PublishError> {
        let name = artifact
            .file_name()
            .map(|n| n.to_string_lossy())
            .ok_or_else(|| PublishError::InvalidKey(format!("no file name in {}", artifact.display())))?;
        Self::new(owner_id, job_id, &name)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// MIME type from the artifact extension
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("gif") => "image/gif",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids() -> (OwnerId, JobId) {
        (OwnerId::parse("alice").unwrap(), JobId::parse("job1").unwrap())
    }

    #[test]
    fn key_is_owner_then_job() {
        let (owner, job) = ids();
        let key = ObjectKey::for_artifact(&owner, &job, Path::new("/ws/media/GeneratedScene.mp4")).unwrap();
        assert_eq!(key.as_str(), "alice/job1/GeneratedScene.mp4");
    }

    #[test]
    fn same_file_name_differs_per_owner() {
        let job = JobId::parse("job1").unwrap();
        let a = ObjectKey::new(&OwnerId::parse("alice").unwrap(), &job, "out.mp4").unwrap();
        let b = ObjectKey::new(&OwnerId::parse("bob").unwrap(), &job, "out.mp4").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn file_name_is_sanitized() {
        let (owner, job) = ids();
        let key = ObjectKey::new(&owner, &job, "my scene?.mp4").unwrap();
        assert_eq!(key.as_str(), "alice/job1/my_scene_.mp4");
        assert!(ObjectKey::new(&owner, &job, "..").is_err());
        assert!(ObjectKey::new(&owner, &job, "").is_err());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
    }
}
