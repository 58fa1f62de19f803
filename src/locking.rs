//! 内存路径锁：串行化同一目标路径上的上传与删除。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;

/// Manages asynchronous mutexes keyed by resolved absolute path.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl LockManager {
    /// 创建新的锁管理器实例。
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 在给定超时时间内获取路径锁，超时返回 Err。
    pub async fn lock_path_with_timeout(
        &self,
        path: &Path,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, ()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // 无持有者也无等待者的条目可以回收
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| ())
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
