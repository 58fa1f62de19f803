//! 进程级操作计数与健康检查处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::APP_NAME;

/// Successful uploads and deletes since process start.
#[derive(Debug, Default)]
pub struct Counters {
    uploads: AtomicU64,
    deletes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub uploads: u64,
    pub deletes: u64,
}

impl Counters {
    pub fn record_upload(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    ok: bool,
    app: &'static str,
}

/// 存活检查。
pub async fn health() -> JsonResponse<HealthResponse> {
    JsonResponse(HealthResponse {
        ok: true,
        app: APP_NAME,
    })
}

/// 返回计数快照。
pub async fn get_metrics(
    Extension(counters): Extension<Arc<Counters>>,
) -> JsonResponse<CountersSnapshot> {
    JsonResponse(counters.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(Counters::default());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let counters = counters.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counters.record_upload();
                }
                counters.record_delete();
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        assert_eq!(
            counters.snapshot(),
            CountersSnapshot {
                uploads: 800,
                deletes: 8
            }
        );
    }
}
