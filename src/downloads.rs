//! On-disk lifecycle of downloaded artifacts.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    /// Name offered to the browser, e.g. `my-video.mp4`.
    pub filename: String,
}

/// Keeps the `keep` most recently modified regular files in `dir` and
/// deletes the rest. Hidden files are ignored. Never fails: every problem is
/// logged and skipped.
pub async fn enforce_retention(dir: &Path, keep: usize) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                warn!("Could not open download directory {:?} for cleanup: {error}", dir);
            }
            return;
        }
    };

    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not list download directory {:?}: {error}", dir);
                break;
            }
        };

        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(error) => {
                warn!("Could not read metadata of {:?}: {error}", path);
                continue;
            }
        };

        match metadata.modified() {
            Ok(modified_at) => files.push((path, modified_at)),
            Err(error) => warn!("Could not read modification time of {:?}: {error}", path),
        }
    }

    if files.len() <= keep {
        return;
    }

    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in files.into_iter().skip(keep) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Deleted old download: {:?}", path),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => warn!("Failed to delete file {:?}: {error}", path),
        }
    }
}

/// `video_<unix-seconds>_<token>`. The random token keeps two downloads
/// started within the same second apart.
pub fn unique_base_name() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("video_{}_{}", Utc::now().timestamp(), &token[..8])
}

/// Finds the file the extractor wrote for `base`: `<base>.<ext>` when the
/// extension is known and present, otherwise the first `<base>.*` entry.
pub async fn resolve_output(dir: &Path, base: &str, ext: Option<&str>) -> Option<PathBuf> {
    if let Some(ext) = ext {
        let expected = dir.join(format!("{base}.{ext}"));
        if is_file(&expected).await {
            return Some(expected);
        }
    }

    let prefix = format!("{base}.");
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&prefix));
        if matches && is_file(&entry.path()).await {
            candidates.push(entry.path());
        }
    }

    candidates.sort();
    candidates.into_iter().next()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

/// Turns a video title into a filename stem: only word characters and
/// single hyphens, lowercase, no leading or trailing hyphen.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|character| {
            character.is_alphanumeric()
                || *character == '_'
                || *character == '-'
                || character.is_whitespace()
        })
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_hyphen = false;
    for character in kept.trim().to_lowercase().chars() {
        if character == '-' || character.is_whitespace() {
            pending_hyphen = true;
            continue;
        }
        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        slug.push(character);
    }

    if slug.is_empty() {
        "video".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, time::Duration};

    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[tokio::test]
    async fn retention_deletes_oldest_beyond_limit() {
        let temp = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..7)
            .map(|index| touch(temp.path(), &format!("video_{index}.mp4"), 100 * (index + 1)))
            .collect();

        enforce_retention(temp.path(), 5).await;

        for (index, path) in paths.iter().enumerate() {
            assert_eq!(path.exists(), index < 5, "{path:?}");
        }
    }

    #[tokio::test]
    async fn retention_ignores_hidden_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let hidden = touch(temp.path(), ".keep", 10_000);
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        let newest = touch(temp.path(), "a.mp4", 1);
        let oldest = touch(temp.path(), "b.mp4", 500);

        enforce_retention(temp.path(), 1).await;

        assert!(hidden.exists());
        assert!(temp.path().join("nested").is_dir());
        assert!(newest.exists());
        assert!(!oldest.exists());
    }

    #[tokio::test]
    async fn retention_tolerates_missing_directory() {
        let temp = TempDir::new().unwrap();
        enforce_retention(&temp.path().join("absent"), 5).await;
    }

    #[test]
    fn base_names_are_distinct() {
        let first = unique_base_name();
        let second = unique_base_name();
        assert!(first.starts_with("video_"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn resolves_expected_then_any_extension() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "video_1_aa.webm", 0);

        let found = resolve_output(temp.path(), "video_1_aa", Some("mp4")).await;
        assert_eq!(found, Some(temp.path().join("video_1_aa.webm")));

        touch(temp.path(), "video_1_aa.mp4", 0);
        let found = resolve_output(temp.path(), "video_1_aa", Some("mp4")).await;
        assert_eq!(found, Some(temp.path().join("video_1_aa.mp4")));

        assert_eq!(resolve_output(temp.path(), "video_2_bb", None).await, None);
    }

    #[test]
    fn sanitizes_titles() {
        assert_eq!(
            sanitize_title("My Video! (2024) — Part #1"),
            "my-video-2024-part-1"
        );
        assert_eq!(sanitize_title("  -- Hello   World -- "), "hello-world");
        assert_eq!(sanitize_title("snake_case_title"), "snake_case_title");
        assert_eq!(sanitize_title("Café Olé"), "café-olé");
        assert_eq!(sanitize_title("!!!"), "video");
    }
}
