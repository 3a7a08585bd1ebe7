use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Which user-facing operation a failure belongs to. The wording shown to
/// the user differs between looking up a video and downloading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    Download,
}

impl Stage {
    fn pick(self, metadata: &'static str, download: &'static str) -> &'static str {
        match self {
            Self::Metadata => metadata,
            Self::Download => download,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("This URL is not from a supported platform")]
    UnsupportedPlatform,

    #[error(
        "{}",
        .0.pick(
            "Network connection error. Please check your internet connection and try again.",
            "Network connection error during download. Please check your internet connection and try again.",
        )
    )]
    Network(Stage),

    #[error(
        "{}",
        .0.pick(
            "Connection timed out. Please try again in a moment.",
            "Download timed out. Please try again in a moment.",
        )
    )]
    Timeout(Stage),

    #[error(
        "{}",
        .0.pick(
            "This video is private or unavailable.",
            "This video is private or no longer available for download.",
        )
    )]
    PrivateOrUnavailable(Stage),

    #[error(
        "{}",
        .0.pick(
            "Video not found. Please check the URL and try again.",
            "Video not found. The link may be broken or the video may have been removed.",
        )
    )]
    NotFound(Stage),

    #[error("The selected quality is not available. Please try a different quality option.")]
    FormatUnavailable,

    #[error("Could not fetch video info: {0}")]
    ExtractionFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Adapter-level failure outside the extraction library itself. The
    /// detail is logged, never shown.
    #[error(
        "{}",
        .0.pick(
            "An error occurred while fetching video info. Please try again.",
            "An unexpected error occurred during download. Please try again.",
        )
    )]
    Unexpected(Stage),

    #[error("Downloaded file not found")]
    ArtifactMissing,

    #[error("Permission denied to access file")]
    FileAccess,

    #[error(
        "{}",
        .0.pick(
            "Unable to fetch video information. Please check the URL and try again.",
            "An unexpected error occurred during download",
        )
    )]
    Internal(Stage),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ArtifactMissing => StatusCode::NOT_FOUND,
            Self::FileAccess => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingUrl => "URL_REQUIRED",
            Self::InvalidUrl => "INVALID_URL",
            Self::UnsupportedPlatform => "UNSUPPORTED_PLATFORM",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::PrivateOrUnavailable(_) => "PRIVATE_OR_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::FormatUnavailable => "FORMAT_UNAVAILABLE",
            Self::ExtractionFailed(_) => "EXTRACTION_FAILED",
            Self::DownloadFailed(_) => "DOWNLOAD_FAILED",
            Self::Unexpected(_) => "UNEXPECTED",
            Self::ArtifactMissing => "FILE_NOT_FOUND",
            Self::FileAccess => "FILE_ACCESS_DENIED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {status}: {self}");
        } else {
            warn!("Request rejected with {status}: {self}");
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
            code: self.code(),
        });

        (status, body).into_response()
    }
}
