use std::{
    any::Any,
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};

use askama::Template;
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{FromRequest, Multipart, Request, State},
    handler::HandlerWithoutStateExt,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use url::Url;

use crate::{
    downloads::DownloadArtifact,
    error::{AppError, Stage},
    service::{MediaService, VideoMetadata},
    sites::{SUPPORTED_SITES, SupportedSite},
};

/// Response bodies are written in pieces of at most this many bytes.
pub const STREAM_CHUNK_BYTES: usize = 4096;

#[derive(Clone)]
pub struct AppState {
    pub media: Arc<MediaService>,
}

pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/get_video_info", post(fetch_video_info))
        .route("/download", post(download))
        .nest_service(
            "/static",
            ServeDir::new(static_dir).not_found_service(page_not_found.into_service()),
        )
        .fallback(page_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(server_error_page))
        .layer(TraceLayer::new_for_http())
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    sites: &'a [SupportedSite],
    error: Option<&'a str>,
}

fn page(status: StatusCode, error_message: Option<&str>) -> Response {
    let template = IndexTemplate {
        sites: &SUPPORTED_SITES,
        error: error_message,
    };

    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(render_error) => {
            error!("Could not render landing page: {render_error}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Server error, please try again later</h1>".to_string()),
            )
                .into_response()
        }
    }
}

async fn index() -> Response {
    page(StatusCode::OK, None)
}

async fn page_not_found() -> Response {
    page(StatusCode::NOT_FOUND, Some("Page not found"))
}

fn server_error_page(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("Request handler panicked");
    page(
        StatusCode::INTERNAL_SERVER_ERROR,
        Some("Server error, please try again later"),
    )
}

/// Form fields from either a urlencoded or a multipart body. A body that
/// cannot be read yields `T::default()`, so handlers report the missing
/// field themselves.
struct FormFields<T>(T);

impl<S, T> FromRequest<S> for FormFields<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        let fields = if is_multipart {
            multipart_fields(req, state).await
        } else {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(fields)| fields)
                .map_err(|rejection| rejection.body_text())
        };

        Ok(FormFields(fields.unwrap_or_else(|reason| {
            warn!("Unreadable form body: {reason}");
            T::default()
        })))
    }
}

async fn multipart_fields<S, T>(req: Request, state: &S) -> Result<T, String>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|rejection| rejection.body_text())?;

    let mut fields = Map::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| error.body_text())?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(|error| error.body_text())?;
        fields.entry(name).or_insert(Value::String(value));
    }

    serde_json::from_value(Value::Object(fields)).map_err(|error| error.to_string())
}

#[derive(Debug, Default, Deserialize)]
struct InfoForm {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct DownloadForm {
    #[serde(default)]
    url: String,
    format_id: Option<String>,
}

async fn fetch_video_info(
    State(state): State<AppState>,
    FormFields(form): FormFields<InfoForm>,
) -> Result<Json<VideoMetadata>, AppError> {
    let url = form.url.trim();
    if url.is_empty() {
        return Err(AppError::MissingUrl);
    }
    if !has_scheme_and_host(url) {
        return Err(AppError::InvalidUrl);
    }

    let metadata = state.media.fetch_metadata(url).await?;
    Ok(Json(metadata))
}

async fn download(
    State(state): State<AppState>,
    FormFields(form): FormFields<DownloadForm>,
) -> Result<Response, AppError> {
    let url = form.url.trim();
    if url.is_empty() {
        return Err(AppError::MissingUrl);
    }
    let format_id = form
        .format_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    let artifact = state.media.download(url, format_id).await?;
    info!(
        "Sending file: {:?}, download name: {}",
        artifact.path, artifact.filename
    );
    stream_artifact(&artifact).await
}

fn has_scheme_and_host(input: &str) -> bool {
    Url::parse(input)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| !host.is_empty()))
        .unwrap_or(false)
}

async fn stream_artifact(artifact: &DownloadArtifact) -> Result<Response, AppError> {
    let content_type = content_type_for_path(&artifact.path);
    let file = open_readable(&artifact.path).await?;
    let file_size = file
        .metadata()
        .await
        .map_err(|error| {
            error!("Could not read size of {:?}: {error}", artifact.path);
            AppError::Internal(Stage::Download)
        })?
        .len();
    info!("File size: {file_size} bytes");

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(file_size));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(&artifact.filename)).map_err(|_| {
            error!("Unusable download filename {:?}", artifact.filename);
            AppError::Internal(Stage::Download)
        })?,
    );

    let body = Body::from_stream(file_chunks(file));
    Ok((headers, body).into_response())
}

fn file_chunks(file: File) -> ReaderStream<File> {
    ReaderStream::with_capacity(file, STREAM_CHUNK_BYTES)
}

/// Opens the artifact for reading, relaxing its permissions once if the
/// first attempt is denied.
async fn open_readable(path: &Path) -> Result<File, AppError> {
    match File::open(path).await {
        Ok(file) => Ok(file),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            error!("File not found: {:?}", path);
            Err(AppError::ArtifactMissing)
        }
        Err(error) if error.kind() == ErrorKind::PermissionDenied => {
            warn!("File not readable: {:?}", path);
            if let Err(error) = relax_permissions(path).await {
                error!("Failed to fix permissions: {error}");
                return Err(AppError::FileAccess);
            }
            File::open(path).await.map_err(|error| {
                error!("File still not readable after fixing permissions: {error}");
                AppError::FileAccess
            })
        }
        Err(error) => {
            error!("Could not open {:?}: {error}", path);
            Err(AppError::Internal(Stage::Download))
        }
    }
}

#[cfg(unix)]
async fn relax_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
async fn relax_permissions(path: &Path) -> io::Result<()> {
    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_readonly(false);
    tokio::fs::set_permissions(path, permissions).await
}

fn content_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "flv" => "video/x-flv",
        _ => "video/mp4",
    }
}

fn content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    if safe_ascii == filename {
        format!("attachment; filename=\"{filename}\"")
    } else {
        format!(
            "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

fn sanitize_ascii_filename(value: &str) -> String {
    value
        .chars()
        .map(|character| {
            if character.is_ascii_graphic() && !matches!(character, '"' | '\\') || character == ' '
            {
                character
            } else {
                '_'
            }
        })
        .collect()
}
