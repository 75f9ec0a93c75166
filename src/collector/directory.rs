//! Evidence source backed by a capture directory.
//!
//! An external capture process drops image files into a directory; this
//! source picks up the newest files modified inside the requested window.

use crate::collector::types::Evidence;
use crate::collector::{CollectorError, EvidenceSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Reads capture files from a directory.
#[derive(Debug, Clone)]
pub struct DirectoryEvidenceSource {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryEvidenceSource {
    /// Create a source for `dir`, accepting the given file extensions.
    pub fn new(dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// The directory being read.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn accepts(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl EvidenceSource for DirectoryEvidenceSource {
    async fn recent_evidence(
        &self,
        window_minutes: u32,
        max_count: usize,
    ) -> Result<Vec<Evidence>, CollectorError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = ?self.dir, "Capture directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(CollectorError::Io(format!("{:?}: {e}", self.dir))),
        };

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(window_minutes) * 60))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CollectorError::Io(e.to_string()))?
        {
            let path = entry.path();
            if !self.accepts(&path) {
                continue;
            }
            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(path = ?path, "Skipping capture file without mtime: {}", e);
                    continue;
                }
            };
            if modified >= cutoff {
                candidates.push((modified, path));
            }
        }

        candidates.sort();
        let skip = candidates.len().saturating_sub(max_count);

        let mut evidence = Vec::with_capacity(candidates.len() - skip);
        for (modified, path) in candidates.into_iter().skip(skip) {
            let payload = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = ?path, "Could not read capture file: {}", e);
                    continue;
                }
            };
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default();
            let origin = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            evidence.push(
                Evidence::captured_at(
                    DateTime::<Utc>::from(modified),
                    Evidence::media_type_for_extension(ext),
                    payload,
                )
                .with_origin(origin),
            );
        }

        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extensions() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string()]
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryEvidenceSource::new(dir.path().join("missing"), &extensions());
        let evidence = source.recent_evidence(2, 5).await.unwrap();
        assert!(evidence.is_empty());
    }

    #[tokio::test]
    async fn test_reads_newest_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            std::fs::write(dir.path().join(format!("cap{i}.png")), [i as u8; 8]).unwrap();
            // Distinct mtimes keep the ordering deterministic
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let source = DirectoryEvidenceSource::new(dir.path(), &extensions());
        let evidence = source.recent_evidence(2, 3).await.unwrap();

        assert_eq!(evidence.len(), 3);
        let origins: Vec<&str> = evidence.iter().filter_map(|e| e.origin.as_deref()).collect();
        assert_eq!(origins, vec!["cap1.png", "cap2.png", "cap3.png"]);
        assert_eq!(evidence[0].media_type, "image/png");
        assert!(evidence.windows(2).all(|w| w[0].captured_at <= w[1].captured_at));
    }
}
