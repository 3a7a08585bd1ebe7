use std::{path::PathBuf, sync::Arc};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::{
    config::Config,
    downloads::{self, DownloadArtifact},
    error::{AppError, Stage},
    extractor::{ExtractorError, FailureKind, FetchOptions, MediaExtractor, ProbeOptions},
    formats::{self, BEST_FORMAT_ID, QualityOption},
    sites,
};

#[derive(Debug, Clone, Serialize)]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail: String,
    /// Seconds, as reported by the extractor (may be fractional).
    pub duration: f64,
    pub uploader: String,
    pub formats: Vec<QualityOption>,
    pub description: String,
    pub url: String,
    pub extractor: String,
}

/// Wraps the extraction capability: gates on supported platforms, bounds
/// concurrent extractor runs, and owns the download directory.
pub struct MediaService {
    extractor: Arc<dyn MediaExtractor>,
    download_dir: PathBuf,
    max_retained: usize,
    permits: Semaphore,
}

impl MediaService {
    pub fn new(extractor: Arc<dyn MediaExtractor>, config: &Config) -> Self {
        Self {
            extractor,
            download_dir: config.download_dir.clone(),
            max_retained: config.max_retained_downloads,
            permits: Semaphore::new(config.max_concurrent_jobs.max(1)),
        }
    }

    pub async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, AppError> {
        if !sites::is_supported(url) {
            return Err(AppError::UnsupportedPlatform);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Internal(Stage::Metadata))?;
        let info = self
            .extractor
            .probe(url, &ProbeOptions::default())
            .await
            .map_err(|error| map_failure(error, Stage::Metadata))?;

        Ok(VideoMetadata {
            title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
            thumbnail: info.thumbnail.unwrap_or_default(),
            duration: info
                .duration
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                .unwrap_or_default(),
            uploader: info
                .uploader
                .unwrap_or_else(|| "Unknown Uploader".to_string()),
            formats: formats::quality_options(&info.formats),
            description: info.description.unwrap_or_default(),
            url: url.to_string(),
            extractor: info.extractor.unwrap_or_default(),
        })
    }

    pub async fn download(
        &self,
        url: &str,
        format_id: Option<&str>,
    ) -> Result<DownloadArtifact, AppError> {
        if !sites::is_supported(url) {
            return Err(AppError::UnsupportedPlatform);
        }

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|error| {
                error!(
                    "Could not create download directory {:?}: {error}",
                    self.download_dir
                );
                AppError::Internal(Stage::Download)
            })?;
        downloads::enforce_retention(&self.download_dir, self.max_retained).await;

        let base = downloads::unique_base_name();
        let options = FetchOptions::new(
            format_id.unwrap_or(BEST_FORMAT_ID),
            self.download_dir.join(&base),
        );

        let info = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| AppError::Internal(Stage::Download))?;
            self.extractor
                .fetch(url, &options)
                .await
                .map_err(|error| map_failure(error, Stage::Download))?
        };
        let info = info.into_single().ok_or_else(|| {
            error!("{} returned an empty playlist for {url}", self.extractor.name());
            AppError::Unexpected(Stage::Download)
        })?;

        let expected_ext = info.ext.as_deref().unwrap_or("mp4");
        let path = downloads::resolve_output(&self.download_dir, &base, Some(expected_ext))
            .await
            .ok_or_else(|| AppError::DownloadFailed("File not found".to_string()))?;
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(expected_ext)
            .to_string();

        let title = info.title.as_deref().unwrap_or("video");
        let filename = format!("{}.{ext}", downloads::sanitize_title(title));

        info!("Downloaded video to {:?}", path);
        Ok(DownloadArtifact { path, filename })
    }
}

fn map_failure(error: ExtractorError, stage: Stage) -> AppError {
    match error {
        ExtractorError::Failed { kind, detail } => {
            error!("Extractor failure ({kind:?}) during {stage:?}: {detail}");
            match kind {
                FailureKind::Network => AppError::Network(stage),
                FailureKind::Timeout => AppError::Timeout(stage),
                FailureKind::Unavailable => AppError::PrivateOrUnavailable(stage),
                FailureKind::NotFound => AppError::NotFound(stage),
                FailureKind::Format if stage == Stage::Download => AppError::FormatUnavailable,
                FailureKind::Format | FailureKind::Other => match stage {
                    Stage::Metadata => AppError::ExtractionFailed(detail),
                    Stage::Download => AppError::DownloadFailed(detail),
                },
            }
        }
        ExtractorError::Internal(detail) => {
            error!("Extractor could not run during {stage:?}: {detail}");
            AppError::Unexpected(stage)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::extractor::{RawFormat, RawVideoInfo, stub::ExtractorStub};

    fn service(temp: &TempDir, stub: Arc<ExtractorStub>) -> MediaService {
        let config = Config {
            download_dir: temp.path().join("downloads"),
            ..Config::default()
        };
        MediaService::new(stub, &config)
    }

    fn sample_info() -> RawVideoInfo {
        RawVideoInfo {
            title: Some("My Video! (2024) — Part #1".to_string()),
            thumbnail: Some("https://i.ytimg.com/vi/abc/hq.jpg".to_string()),
            duration: Some(212.6),
            uploader: Some("Someone".to_string()),
            extractor: Some("youtube".to_string()),
            ext: Some("mp4".to_string()),
            formats: vec![RawFormat {
                format_id: Some("18".to_string()),
                ext: Some("mp4".to_string()),
                height: Some(360),
                vcodec: Some("avc1".to_string()),
                ..RawFormat::default()
            }],
            ..RawVideoInfo::default()
        }
    }

    #[tokio::test]
    async fn unsupported_urls_never_reach_the_extractor() {
        let temp = TempDir::new().unwrap();
        let stub = Arc::new(ExtractorStub::with_info(sample_info()));
        let service = service(&temp, stub.clone());

        let metadata = service.fetch_metadata("https://vimeo.com/1").await;
        assert!(matches!(metadata, Err(AppError::UnsupportedPlatform)));

        let download = service.download("https://vimeo.com/1", None).await;
        assert!(matches!(download, Err(AppError::UnsupportedPlatform)));

        assert_eq!(stub.calls(), 0);
        assert!(!temp.path().join("downloads").exists());
    }

    #[tokio::test]
    async fn metadata_is_simplified() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, Arc::new(ExtractorStub::with_info(sample_info())));

        let metadata = service
            .fetch_metadata("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();

        assert_eq!(metadata.title, "My Video! (2024) — Part #1");
        assert_eq!(metadata.duration, 212.6);
        assert_eq!(metadata.extractor, "youtube");
        assert_eq!(metadata.url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(metadata.formats.len(), 3);
        assert_eq!(metadata.formats[2].resolution, "360p");
    }

    #[tokio::test]
    async fn missing_metadata_gets_defaults() {
        let temp = TempDir::new().unwrap();
        let service = service(
            &temp,
            Arc::new(ExtractorStub::with_info(RawVideoInfo::default())),
        );

        let metadata = service.fetch_metadata("https://youtu.be/abc").await.unwrap();
        assert_eq!(metadata.title, "Unknown Title");
        assert_eq!(metadata.uploader, "Unknown Uploader");
        assert_eq!(metadata.duration, 0.0);
        assert_eq!(metadata.formats.len(), 2);
    }

    #[tokio::test]
    async fn failures_map_by_stage() {
        let temp = TempDir::new().unwrap();
        let format = Arc::new(ExtractorStub::failing(
            FailureKind::Format,
            "Requested format is not available",
        ));
        let service = service(&temp, format);

        let metadata = service.fetch_metadata("https://youtu.be/abc").await;
        assert!(matches!(metadata, Err(AppError::ExtractionFailed(detail)) if detail.contains("format")));

        let download = service.download("https://youtu.be/abc", Some("137")).await;
        assert!(matches!(download, Err(AppError::FormatUnavailable)));

        assert!(matches!(
            map_failure(ExtractorError::Internal("spawn".into()), Stage::Metadata),
            AppError::Unexpected(Stage::Metadata)
        ));
        assert!(matches!(
            map_failure(
                ExtractorError::Failed {
                    kind: FailureKind::Other,
                    detail: "boom".into()
                },
                Stage::Download
            ),
            AppError::DownloadFailed(detail) if detail == "boom"
        ));
    }

    #[tokio::test]
    async fn download_produces_artifact_with_clean_name() {
        let temp = TempDir::new().unwrap();
        let stub = Arc::new(ExtractorStub {
            payload: b"data".to_vec(),
            ..ExtractorStub::with_info(sample_info())
        });
        let service = service(&temp, stub.clone());

        let artifact = service
            .download("https://youtu.be/abc", None)
            .await
            .unwrap();

        assert_eq!(artifact.filename, "my-video-2024-part-1.mp4");
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"data");

        let options = stub.last_fetch.lock().unwrap().clone().unwrap();
        assert_eq!(options.format, "best");
        assert!(options.output_base.starts_with(temp.path().join("downloads")));
    }

    #[tokio::test]
    async fn missing_output_file_is_a_download_failure() {
        let temp = TempDir::new().unwrap();
        let stub = Arc::new(ExtractorStub {
            skip_write: true,
            ..ExtractorStub::with_info(sample_info())
        });
        let service = service(&temp, stub);

        let result = service.download("https://youtu.be/abc", None).await;
        assert!(matches!(result, Err(AppError::DownloadFailed(detail)) if detail == "File not found"));
    }

    #[tokio::test]
    async fn download_applies_retention_first() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("downloads");
        std::fs::create_dir_all(&dir).unwrap();
        for index in 0..6 {
            std::fs::write(dir.join(format!("old_{index}.mp4")), b"x").unwrap();
        }

        let stub = Arc::new(ExtractorStub::with_info(sample_info()));
        let service = MediaService::new(
            stub,
            &Config {
                download_dir: dir.clone(),
                max_retained_downloads: 2,
                ..Config::default()
            },
        );
        service.download("https://youtu.be/abc", None).await.unwrap();

        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 3);
    }
}
