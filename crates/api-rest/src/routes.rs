//! HTTP handlers.
//!
//! The storage service is synchronous (filesystem and scan oracle I/O), so every handler runs
//! it on the blocking pool.

use crate::dto::{DepositReq, FileInfoRes, GetMultipleReq, HealthRes, UpdateStatusReq};
use crate::error::{ApiError, ErrorBody};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
    Router,
};
use bsfm_core::{DepositKind, Download, FileStorageService, StoreResult};
use serde::Deserialize;
use std::io::Read;
use unicode_normalization::UnicodeNormalization;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_info,
        get_multiple,
        list_folder,
        list_owner_folder,
        deposit,
        deposit_special,
        deposit_public,
        download,
        download_public,
        update_status,
        soft_delete,
        hard_delete
    ),
    components(schemas(
        HealthRes,
        DepositReq,
        GetMultipleReq,
        UpdateStatusReq,
        FileInfoRes,
        ErrorBody,
        crate::error::ErrorDetail
    ))
)]
pub struct ApiDoc;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/fileInfos/getMultiple", post(get_multiple))
        .route("/fileInfos/:file_key", get(get_info).delete(hard_delete))
        .route("/fileInfos/:file_key/getContent", get(download))
        .route("/fileInfos/:file_key/updateStatus", patch(update_status))
        .route("/fileInfos/:file_key/soft", delete(soft_delete))
        .route("/publicContent/:file_key", get(download_public))
        .route(
            "/owners/:owner_key/folders/:folder/fileInfos",
            get(list_owner_folder),
        )
        .route("/folders/:folder/fileInfos", get(list_folder))
        .route("/folders/:folder/files", post(deposit))
        .route("/special-folders/:folder/files", post(deposit_special))
        .route("/public-folders/:folder/files", post(deposit_public))
}

async fn run<T, F>(state: &AppState, operation: F) -> Result<T, ApiError>
where
    F: FnOnce(&FileStorageService) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = state.service.clone();
    tokio::task::spawn_blocking(move || operation(service.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(format!("storage task failed: {e}")))?
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct FolderParams {
    pub owner: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct YearParams {
    pub year: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Blob store REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/fileInfos/{file_key}",
    params(("file_key" = String, Path, description = "File key")),
    responses(
        (status = 200, description = "File metadata", body = FileInfoRes),
        (status = 404, description = "Unknown file key", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn get_info(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> Result<Json<FileInfoRes>, ApiError> {
    let record = run(&state, move |s| s.get_info(&file_key)).await?;
    Ok(Json(FileInfoRes::from(&record)))
}

#[utoipa::path(
    post,
    path = "/api/v1/fileInfos/getMultiple",
    request_body = GetMultipleReq,
    responses(
        (status = 200, description = "Metadata ordered by original filename", body = Vec<FileInfoRes>),
        (status = 403, description = "At least one key is unknown", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn get_multiple(
    State(state): State<AppState>,
    Json(req): Json<GetMultipleReq>,
) -> Result<Json<Vec<FileInfoRes>>, ApiError> {
    let records = run(&state, move |s| s.get_multiple(&req.file_keys)).await?;
    Ok(Json(records.iter().map(FileInfoRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/folders/{folder}/fileInfos",
    params(
        ("folder" = String, Path, description = "Logical folder"),
        ("owner" = Option<String>, Query, description = "Owner key, `*` for any"),
        ("year" = Option<i32>, Query, description = "Target year, 0 for any")
    ),
    responses(
        (status = 200, description = "Folder content ordered by original filename", body = Vec<FileInfoRes>),
        (status = 404, description = "No matching files", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn list_folder(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Query(params): Query<FolderParams>,
) -> Result<Json<Vec<FileInfoRes>>, ApiError> {
    let records = run(&state, move |s| {
        s.list_folder(&folder, params.owner.as_deref(), params.year)
    })
    .await?;
    Ok(Json(records.iter().map(FileInfoRes::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/v1/owners/{owner_key}/folders/{folder}/fileInfos",
    params(
        ("owner_key" = String, Path, description = "Owner key"),
        ("folder" = String, Path, description = "Logical folder"),
        ("year" = Option<i32>, Query, description = "Target year, 0 for any")
    ),
    responses(
        (status = 200, description = "Folder content ordered by original filename", body = Vec<FileInfoRes>),
        (status = 404, description = "No matching files", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn list_owner_folder(
    State(state): State<AppState>,
    Path((owner_key, folder)): Path<(String, String)>,
    Query(params): Query<YearParams>,
) -> Result<Json<Vec<FileInfoRes>>, ApiError> {
    let records = run(&state, move |s| {
        s.list_folder(&folder, Some(owner_key.as_str()), params.year)
    })
    .await?;
    Ok(Json(records.iter().map(FileInfoRes::from).collect()))
}

async fn deposit_as(
    state: AppState,
    kind: DepositKind,
    folder: String,
    req: DepositReq,
) -> Result<(StatusCode, Json<FileInfoRes>), ApiError> {
    let record = run(&state, move |s| {
        let (attributes, content) = req.into_parts()?;
        s.deposit(kind, &folder, attributes, &content)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(FileInfoRes::from(&record))))
}

#[utoipa::path(
    post,
    path = "/api/v1/folders/{folder}/files",
    params(("folder" = String, Path, description = "Logical folder")),
    request_body = DepositReq,
    responses(
        (status = 201, description = "File stored", body = FileInfoRes),
        (status = 400, description = "Invalid attributes or content", body = ErrorBody),
        (status = 409, description = "File already exists, or VIRUS_FOUND", body = ErrorBody),
        (status = 500, description = "Storage or scan failure", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn deposit(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Json(req): Json<DepositReq>,
) -> Result<(StatusCode, Json<FileInfoRes>), ApiError> {
    deposit_as(state, DepositKind::Ordinary, folder, req).await
}

#[utoipa::path(
    post,
    path = "/api/v1/special-folders/{folder}/files",
    params(("folder" = String, Path, description = "Special folder")),
    request_body = DepositReq,
    responses(
        (status = 201, description = "File stored and handed off", body = FileInfoRes),
        (status = 400, description = "Missing external reference or invalid attributes", body = ErrorBody),
        (status = 409, description = "File already exists, or VIRUS_FOUND", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn deposit_special(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Json(req): Json<DepositReq>,
) -> Result<(StatusCode, Json<FileInfoRes>), ApiError> {
    deposit_as(state, DepositKind::Special, folder, req).await
}

#[utoipa::path(
    post,
    path = "/api/v1/public-folders/{folder}/files",
    params(("folder" = String, Path, description = "Public folder")),
    request_body = DepositReq,
    responses(
        (status = 201, description = "File stored", body = FileInfoRes),
        (status = 409, description = "File already exists, or VIRUS_FOUND", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn deposit_public(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Json(req): Json<DepositReq>,
) -> Result<(StatusCode, Json<FileInfoRes>), ApiError> {
    deposit_as(state, DepositKind::Public, folder, req).await
}

#[utoipa::path(
    get,
    path = "/api/v1/fileInfos/{file_key}/getContent",
    params(("file_key" = String, Path, description = "File key")),
    responses(
        (status = 200, description = "File content with its stored content type"),
        (status = 403, description = "File deleted", body = ErrorBody),
        (status = 404, description = "Unknown key or missing content", body = ErrorBody),
        (status = 409, description = "VIRUS_FOUND", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn download(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> Result<Response, ApiError> {
    let (download, body) = run(&state, move |s| read_fully(s.download(&file_key)?)).await?;
    content_response(download, body)
}

#[utoipa::path(
    get,
    path = "/api/v1/publicContent/{file_key}",
    params(("file_key" = String, Path, description = "File key")),
    responses(
        (status = 200, description = "File content with its stored content type"),
        (status = 403, description = "File is not public or was deleted", body = ErrorBody),
        (status = 409, description = "VIRUS_FOUND", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn download_public(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> Result<Response, ApiError> {
    let (download, body) =
        run(&state, move |s| read_fully(s.download_public(&file_key)?)).await?;
    content_response(download, body)
}

fn read_fully(mut download: Download) -> StoreResult<(Download, Vec<u8>)> {
    let mut body = Vec::with_capacity(usize::try_from(download.content.len()).unwrap_or(0));
    download.content.read_to_end(&mut body).map_err(|e| {
        bsfm_core::StoreError::ServerFault(format!(
            "failed to read {}: {e}",
            download.content.path().display()
        ))
    })?;
    Ok((download, body))
}

fn content_response(download: Download, body: Vec<u8>) -> Result<Response, ApiError> {
    let record = &download.record;
    let disposition = if record.is_attachment() {
        "attachment"
    } else {
        "inline"
    };
    let disposition = format!(
        "{disposition}; filename={}",
        normalize_filename(record.original_file_name())
    );

    let header_value = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|e| ApiError::Internal(format!("invalid header value {value:?}: {e}")))
    };

    let length = HeaderValue::from(body.len());
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header_value(record.content_type())?);
    headers.insert(header::CONTENT_LENGTH, length);
    headers.insert(header::CONTENT_DISPOSITION, header_value(&disposition)?);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(response)
}

/// Makes a filename safe for a `Content-Disposition` header.
///
/// The name is decomposed (NFD) and its combining diacritical marks dropped, so accented
/// letters keep their base letter; anything else outside `[A-Za-z0-9_.]` becomes `_`.
pub fn normalize_filename(name: &str) -> String {
    name.nfd()
        .filter(|c| !COMBINING_MARKS.contains(c))
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{300}'..='\u{36f}';

#[utoipa::path(
    patch,
    path = "/api/v1/fileInfos/{file_key}/updateStatus",
    params(("file_key" = String, Path, description = "File key")),
    request_body = UpdateStatusReq,
    responses(
        (status = 200, description = "Status updated", body = FileInfoRes),
        (status = 400, description = "Missing status", body = ErrorBody),
        (status = 404, description = "Unknown file key", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn update_status(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
    Json(req): Json<UpdateStatusReq>,
) -> Result<Json<FileInfoRes>, ApiError> {
    let record = run(&state, move |s| {
        s.update_status(&file_key, req.status, req.status_linked_data)
    })
    .await?;
    Ok(Json(FileInfoRes::from(&record)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/fileInfos/{file_key}/soft",
    params(("file_key" = String, Path, description = "File key")),
    responses(
        (status = 200, description = "File hidden", body = FileInfoRes),
        (status = 404, description = "Unknown file key", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn soft_delete(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> Result<Json<FileInfoRes>, ApiError> {
    let record = run(&state, move |s| s.soft_delete(&file_key)).await?;
    Ok(Json(FileInfoRes::from(&record)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/fileInfos/{file_key}",
    params(("file_key" = String, Path, description = "File key")),
    responses(
        (status = 204, description = "File and metadata removed"),
        (status = 404, description = "Unknown file key", body = ErrorBody),
        (status = 500, description = "Physical removal failed; metadata kept", body = ErrorBody)
    )
)]
#[axum::debug_handler]
async fn hard_delete(
    State(state): State<AppState>,
    Path(file_key): Path<String>,
) -> Result<StatusCode, ApiError> {
    run(&state, move |s| s.hard_delete(&file_key)).await?;
    Ok(StatusCode::NO_CONTENT)
}
