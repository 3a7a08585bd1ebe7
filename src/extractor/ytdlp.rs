use std::{io::ErrorKind, process::Output, time::Duration};

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::debug;

use super::{
    ExtractorError, FailureKind, FetchOptions, MediaExtractor, ProbeOptions, RawVideoInfo,
    RetryPolicy,
};

/// Runs the `yt-dlp` executable. Its failures only exist as stderr prose, so
/// they are classified with [`FailureKind::classify`].
pub struct YtDlp {
    binary: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, ExtractorError> {
        debug!("Running {} {:?}", self.binary, args);

        let command_future = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| ExtractorError::Failed {
                kind: FailureKind::Timeout,
                detail: format!("{} timed out after {:?}", self.binary, self.timeout),
            })?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractorError::Internal(format!("{} is not installed", self.binary))
                } else {
                    ExtractorError::Internal(format!("could not run {}: {error}", self.binary))
                }
            })?;

        if !output.status.success() {
            let detail = last_error_line(&output.stderr);
            return Err(ExtractorError::Failed {
                kind: FailureKind::classify(&detail),
                detail,
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(
        &self,
        url: &str,
        options: &ProbeOptions,
    ) -> Result<RawVideoInfo, ExtractorError> {
        let output = self.run(probe_args(url, options)).await?;
        parse_info(&output.stdout)
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<RawVideoInfo, ExtractorError> {
        let output = self.run(fetch_args(url, options)).await?;
        parse_info(&output.stdout)
    }
}

fn probe_args(url: &str, options: &ProbeOptions) -> Vec<String> {
    let mut args = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--socket-timeout".to_string(),
        options.socket_timeout_secs.to_string(),
        "--http-chunk-size".to_string(),
        options.http_chunk_size.to_string(),
    ];
    push_retry_args(&mut args, &options.retry);
    args.push(url.to_string());
    args
}

fn fetch_args(url: &str, options: &FetchOptions) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        options.format.clone(),
        "-o".to_string(),
        format!("{}.%(ext)s", options.output_base.to_string_lossy()),
        "--dump-json".to_string(),
        "--no-simulate".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-progress".to_string(),
        "--socket-timeout".to_string(),
        options.socket_timeout_secs.to_string(),
        "--http-chunk-size".to_string(),
        options.http_chunk_size.to_string(),
        "--buffer-size".to_string(),
        "1K".to_string(),
        "--downloader".to_string(),
        "native".to_string(),
    ];
    args.push(if options.continue_partial {
        "--continue".to_string()
    } else {
        "--no-continue".to_string()
    });
    if options.prefer_insecure {
        args.push("--prefer-insecure".to_string());
    }
    push_retry_args(&mut args, &options.retry);
    args.push(url.to_string());
    args
}

fn push_retry_args(args: &mut Vec<String>, retry: &RetryPolicy) {
    args.extend([
        "--retries".to_string(),
        retry.retries.to_string(),
        "--fragment-retries".to_string(),
        retry.fragment_retries.to_string(),
        "--extractor-retries".to_string(),
        retry.extractor_retries.to_string(),
    ]);
    if let Some(file_access_retries) = retry.file_access_retries {
        args.push("--file-access-retries".to_string());
        args.push(file_access_retries.to_string());
    }
}

/// `-J` prints one document, `--dump-json` prints one line per item; the
/// first document is the one that matters in both cases.
fn parse_info(stdout: &[u8]) -> Result<RawVideoInfo, ExtractorError> {
    serde_json::Deserializer::from_slice(stdout)
        .into_iter::<RawVideoInfo>()
        .next()
        .ok_or_else(|| ExtractorError::Internal("yt-dlp printed no metadata".to_string()))?
        .map_err(|error| ExtractorError::Internal(format!("unreadable yt-dlp output: {error}")))
}

fn last_error_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .trim_start_matches("ERROR:")
        .trim()
        .to_string()
}
