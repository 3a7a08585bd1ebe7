//! Narrow interface over the external extraction tool.
//!
//! Callers only see [`RawVideoInfo`] and a structured [`ExtractorError`];
//! how a concrete backend learns the failure kind is its own business.

mod ytdlp;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub use ytdlp::YtDlp;

pub const HTTP_CHUNK_SIZE_BYTES: u64 = 10 * 1024 * 1024;
pub const SOCKET_TIMEOUT_SECONDS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_retries: u32,
    pub file_access_retries: Option<u32>,
}

/// Metadata-only lookup. No media bytes are transferred.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub retry: RetryPolicy,
    pub socket_timeout_secs: u32,
    pub http_chunk_size: u64,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy {
                retries: 3,
                fragment_retries: 3,
                extractor_retries: 3,
                file_access_retries: None,
            },
            socket_timeout_secs: SOCKET_TIMEOUT_SECONDS,
            http_chunk_size: HTTP_CHUNK_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Format selector, e.g. `best` or `bv*+ba/b`.
    pub format: String,
    /// Output path without extension; the backend appends `.<ext>`.
    pub output_base: PathBuf,
    pub retry: RetryPolicy,
    pub socket_timeout_secs: u32,
    pub http_chunk_size: u64,
    pub continue_partial: bool,
    pub prefer_insecure: bool,
}

impl FetchOptions {
    pub fn new(format: impl Into<String>, output_base: PathBuf) -> Self {
        Self {
            format: format.into(),
            output_base,
            retry: RetryPolicy {
                retries: 5,
                fragment_retries: 5,
                extractor_retries: 3,
                file_access_retries: Some(3),
            },
            socket_timeout_secs: SOCKET_TIMEOUT_SECONDS,
            http_chunk_size: HTTP_CHUNK_SIZE_BYTES,
            continue_partial: true,
            prefer_insecure: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVideoInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub description: Option<String>,
    pub extractor: Option<String>,
    pub ext: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
    pub entries: Option<Vec<RawVideoInfo>>,
}

impl RawVideoInfo {
    /// Collapses a playlist result to its first entry. Non-playlist results
    /// are returned unchanged; an empty playlist yields `None`.
    pub fn into_single(self) -> Option<Self> {
        match self.entries {
            Some(entries) => entries.into_iter().next(),
            None => Some(self),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub resolution: Option<String>,
    pub format_note: Option<String>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Timeout,
    Unavailable,
    NotFound,
    Format,
    Other,
}

impl FailureKind {
    /// Best-effort classification of a human-readable failure message. Only
    /// meant for backends that report failures as prose.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

        if mentions(&["ssl", "certificate"]) {
            Self::Network
        } else if mentions(&["timeout", "timed out"]) {
            Self::Timeout
        } else if mentions(&["private", "unavailable"]) {
            Self::Unavailable
        } else if mentions(&["not found", "404"]) {
            Self::NotFound
        } else if mentions(&["format"]) {
            Self::Format
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The extraction tool ran and reported a failure.
    #[error("{detail}")]
    Failed { kind: FailureKind, detail: String },

    /// The tool could not be run or its output could not be understood.
    #[error("{0}")]
    Internal(String),
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, url: &str, options: &ProbeOptions)
    -> Result<RawVideoInfo, ExtractorError>;

    async fn fetch(&self, url: &str, options: &FetchOptions)
    -> Result<RawVideoInfo, ExtractorError>;
}
