//! 流式上传：随机化存储名、限制大小并清理失败的部分写入。

use axum::body::{Body as AxumBody, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, header};
use axum::response::Json as JsonResponse;
use futures_util::stream::{Stream, StreamExt};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, ErrorKind};
use tracing::{debug, info, warn};

use crate::auth::{AuthConfig, ensure_authorized};
use crate::config::DEFAULT_LOCK_WAIT_TIMEOUT_SECS;
use crate::error::ApiError;
use crate::http::{PathParams, path_param};
use crate::locking::LockManager;
use crate::metrics::Counters;
use crate::storage::{Storage, StorageError, check_lexical, validate_relative};

#[derive(Debug)]
pub struct UploadConfig {
    /// 0 表示不限制。
    pub max_bytes: u64,
}

#[derive(Deserialize)]
pub(crate) struct UploadQuery {
    overwrite: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct UploadResponse {
    ok: bool,
    original: String,
    stored_as: String,
    saved_to: String,
}

/// Replaces the basename's stem with 128 random bits in hex.
///
/// The directory part is kept verbatim and the extension is lower-cased.
pub fn randomize_name(original: &str) -> String {
    let (dir, base) = match original.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, original),
    };
    let token = hex::encode(rand::random::<[u8; 16]>());
    let stored_base = match Path::new(base).extension() {
        Some(ext) => format!("{token}.{}", ext.to_string_lossy().to_lowercase()),
        None => token,
    };
    match dir {
        Some(dir) => format!("{dir}/{stored_base}"),
        None => stored_base,
    }
}

/// 解析布尔查询参数，接受 1/0、true/false、yes/no、on/off 等写法。
fn parse_flag(name: &str, value: Option<&str>) -> Result<bool, ApiError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" | "" => Ok(false),
        _ => Err(ApiError::BadRequest(format!("invalid boolean for {name}"))),
    }
}

/// 部分写入文件的守卫：未提交时在 Drop 中删除文件。
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // Drop 中无法 await，单次 unlink 直接同步执行
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "removed partial upload"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = ?self.path, error = %err, "failed to remove partial upload"),
        }
    }
}

/// Streams chunks into `target`, enforcing `max_bytes` (0 disables it).
///
/// Any failure, including the future being dropped mid-stream, removes the
/// partially written file.
pub async fn write_stream<S, E>(
    target: &Path,
    mut chunks: S,
    max_bytes: u64,
    overwrite: bool,
) -> Result<u64, StorageError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    match fs::symlink_metadata(target).await {
        Ok(metadata) if metadata.is_dir() => return Err(StorageError::IsDirectory),
        Ok(_) if !overwrite => return Err(StorageError::AlreadyExists),
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(StorageError::Write(err)),
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(StorageError::Write)?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let mut file = match options.open(target).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(StorageError::AlreadyExists);
        }
        Err(err) => return Err(StorageError::Write(err)),
    };
    let partial = PartialFile::new(target);

    let mut total_written: u64 = 0;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|err| StorageError::Write(io::Error::other(err)))?;
        if chunk.is_empty() {
            continue;
        }
        let next_total = total_written + chunk.len() as u64;
        if max_bytes > 0 && next_total > max_bytes {
            drop(file);
            warn!(path = ?target, limit = max_bytes, "upload exceeded size limit");
            return Err(StorageError::TooLarge { limit: max_bytes });
        }
        file.write_all(&chunk).await.map_err(StorageError::Write)?;
        total_written = next_total;
    }

    file.flush().await.map_err(StorageError::Write)?;
    file.sync_all().await.map_err(StorageError::Write)?;
    partial.commit();
    Ok(total_written)
}

/// 上传文件：校验路径与令牌，随机化文件名后流式写入。
pub async fn upload_file(
    params: PathParams,
    query: Result<Query<UploadQuery>, QueryRejection>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(auth): Extension<Arc<AuthConfig>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    Extension(lock_manager): Extension<Arc<LockManager>>,
    Extension(counters): Extension<Arc<Counters>>,
    body: AxumBody,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let path = path_param(params)?;
    let Query(query) = query?;
    let overwrite = parse_flag("overwrite", query.overwrite.as_deref())?;
    validate_relative(&path)?;
    let stored_as = randomize_name(&path);
    check_lexical(&stored_as)?;
    ensure_authorized(&auth, &headers)?;
    let target = storage.resolve(&stored_as).await?;

    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if let Some(len) = declared_len
        && upload.max_bytes > 0
        && len > upload.max_bytes
    {
        warn!(path, declared_len = len, "upload rejected by content-length");
        return Err(StorageError::TooLarge {
            limit: upload.max_bytes,
        }
        .into());
    }

    let _guard = lock_manager
        .lock_path_with_timeout(&target, Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS))
        .await
        .map_err(|_| ApiError::Conflict("path locked".into()))?;
    let data_stream = BodyExt::into_data_stream(body);
    let written = write_stream(&target, data_stream, upload.max_bytes, overwrite).await?;
    counters.record_upload();

    let stored_as = storage.relative_to_root(&target)?;
    info!(
        original = path,
        stored_as,
        bytes = written,
        overwrite,
        "upload saved"
    );
    Ok(JsonResponse(UploadResponse {
        ok: true,
        original: path,
        stored_as,
        saved_to: target.to_string_lossy().into_owned(),
    }))
}
