//! 文件列表与删除处理器。

use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query};
use axum::http::HeaderMap;
use axum::response::Json as JsonResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{AuthConfig, ensure_authorized};
use crate::config::{DEFAULT_LIST_LIMIT, DEFAULT_LOCK_WAIT_TIMEOUT_SECS, MAX_LIST_LIMIT};
use crate::error::ApiError;
use crate::http::{PathParams, path_param};
use crate::locking::LockManager;
use crate::metrics::Counters;
use crate::storage::{Storage, StorageError, check_lexical};

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    prefix: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct ListResponse {
    ok: bool,
    items: Vec<String>,
    count: usize,
}

#[derive(Serialize)]
pub(crate) struct DeleteResponse {
    ok: bool,
    deleted: String,
}

/// 列出前缀下的文件。
pub async fn list_files(
    query: Result<Query<ListQuery>, QueryRejection>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<ListResponse>, ApiError> {
    let Query(query) = query?;
    let limit = parse_limit(query.limit.as_deref())?;
    let prefix = query.prefix.as_deref().unwrap_or("");
    let items = storage.list_files(prefix, limit).await?;
    info!(prefix, limit, count = items.len(), "list files");
    Ok(JsonResponse(ListResponse {
        ok: true,
        count: items.len(),
        items,
    }))
}

/// 解析 `limit` 参数，缺省为 200，范围 1..=2000。
fn parse_limit(value: Option<&str>) -> Result<usize, StorageError> {
    let limit = match value.map(str::trim) {
        None | Some("") => DEFAULT_LIST_LIMIT,
        Some(value) => value.parse::<i64>().map_err(|_| StorageError::InvalidLimit)?,
    };
    if !(1..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(StorageError::InvalidLimit);
    }
    Ok(limit as usize)
}

/// 删除单个文件。
pub async fn delete_file(
    params: PathParams,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(lock_manager): Extension<Arc<LockManager>>,
    Extension(counters): Extension<Arc<Counters>>,
) -> Result<JsonResponse<DeleteResponse>, ApiError> {
    let path = path_param(params)?;
    check_lexical(&path)?;
    ensure_authorized(&auth, &headers)?;
    let target = storage.resolve(&path).await?;

    let _guard = lock_manager
        .lock_path_with_timeout(&target, Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS))
        .await
        .map_err(|_| ApiError::Conflict("path locked".into()))?;
    storage.delete_file(&target).await?;
    counters.record_delete();

    let deleted = storage.relative_to_root(&target)?;
    info!(path, deleted, "delete file");
    Ok(JsonResponse(DeleteResponse { ok: true, deleted }))
}
