use std::{path::PathBuf, time::Duration};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_RETAINED_DOWNLOADS: usize = 5;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;
const DEFAULT_EXTRACTOR_TIMEOUT_SECONDS: u64 = 10 * 60;
const DEV_SESSION_SECRET: &str = "default_secret_key_for_development";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub download_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Artifacts kept in `download_dir`, counted before each new download.
    pub max_retained_downloads: usize,
    pub max_concurrent_jobs: usize,
    pub extractor_timeout: Duration,
    pub ytdlp_bin: String,
    pub session_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            download_dir: root.join("temp_downloads"),
            static_dir: root.join("static"),
            max_retained_downloads: DEFAULT_MAX_RETAINED_DOWNLOADS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            extractor_timeout: Duration::from_secs(DEFAULT_EXTRACTOR_TIMEOUT_SECONDS),
            ytdlp_bin: "yt-dlp".to_string(),
            session_secret: DEV_SESSION_SECRET.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: resolve_bind_addr(),
            download_dir: read_string_env("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.download_dir),
            static_dir: read_string_env("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            max_retained_downloads: read_usize_env("MAX_RETAINED_DOWNLOADS")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_retained_downloads),
            max_concurrent_jobs: read_usize_env("MAX_CONCURRENT_JOBS")
                .filter(|value| *value > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            extractor_timeout: read_u64_env("EXTRACTOR_TIMEOUT_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.extractor_timeout),
            ytdlp_bin: read_string_env("YT_DLP_BIN").unwrap_or(defaults.ytdlp_bin),
            session_secret: read_string_env("SESSION_SECRET").unwrap_or(defaults.session_secret),
        }
    }

    pub fn uses_dev_session_secret(&self) -> bool {
        self.session_secret == DEV_SESSION_SECRET
    }
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = read_string_env("APP_ADDR") {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

fn read_string_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_usize_env(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
}

fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}
