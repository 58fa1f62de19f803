//! 基础目录内的安全路径解析、文件列举与删除。

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::ErrorKind;

/// Storage rooted at one canonical base directory.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// 创建（必要时）并规范化基础目录。
    pub async fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        let root = fs::canonicalize(root.as_ref()).await?;
        Ok(Self { root })
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Resolves a client path to a canonical absolute path inside the root.
    ///
    /// Existing components are canonicalized (symlinks followed), missing
    /// ones are applied lexically on top of the deepest existing ancestor.
    /// Nothing is created. The result may equal the root itself.
    pub async fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        validate_relative(relative)?;

        let mut current = self.root.clone();
        // 尚不存在的尾部路径段数量
        let mut missing = 0usize;

        for component in Path::new(relative).components() {
            match component {
                Component::CurDir => continue,
                Component::ParentDir => {
                    if !current.pop() {
                        return Err(StorageError::PathTraversal);
                    }
                    missing = missing.saturating_sub(1);
                }
                Component::Normal(segment) => {
                    current.push(segment);
                    if missing > 0 {
                        missing += 1;
                        continue;
                    }
                    match fs::symlink_metadata(&current).await {
                        Ok(metadata) => {
                            let canonical = fs::canonicalize(&current).await;
                            current = match canonical {
                                Ok(path) => path,
                                Err(err)
                                    if err.kind() == ErrorKind::NotFound
                                        && metadata.file_type().is_symlink() =>
                                {
                                    return Err(StorageError::PathTraversal);
                                }
                                Err(err) => return Err(StorageError::Resolve(err)),
                            };
                        }
                        Err(err) if err.kind() == ErrorKind::NotFound => missing = 1,
                        Err(err) if err.kind() == ErrorKind::NotADirectory => {
                            return Err(StorageError::InvalidPath);
                        }
                        Err(err) => return Err(StorageError::Resolve(err)),
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::AbsolutePath);
                }
            }
        }

        if !current.starts_with(&self.root) {
            return Err(StorageError::PathTraversal);
        }
        Ok(current)
    }

    /// Converts a path inside the root to its `/`-separated relative form.
    pub fn relative_to_root(&self, path: &Path) -> Result<String, StorageError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::PathTraversal)?;
        Ok(relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }

    /// 递归列出前缀下的常规文件，最多 `limit` 个。
    pub async fn list_files(&self, prefix: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        if prefix.starts_with(['/', '\\']) {
            return Err(StorageError::AbsolutePath);
        }
        let prefix = prefix.trim_end_matches(['/', '\\']);
        let scan_root = if prefix.is_empty() {
            self.root.clone()
        } else {
            let target = self.resolve(prefix).await?;
            let metadata = fs::metadata(&target).await;
            match metadata {
                Ok(metadata) if metadata.is_dir() => target,
                Ok(_) => match target.parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => return Ok(Vec::new()),
                },
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(StorageError::List(err)),
            }
        };

        let mut items = Vec::new();
        let mut pending = vec![scan_root];
        while let Some(dir) = pending.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StorageError::List(err)),
            };

            let mut files = Vec::new();
            let mut dirs = Vec::new();
            while let Some(entry) = reader.next_entry().await.map_err(StorageError::List)? {
                let file_type = entry.file_type().await.map_err(StorageError::List)?;
                if file_type.is_file() {
                    files.push(entry.path());
                } else if file_type.is_dir() {
                    dirs.push(entry.path());
                }
            }
            files.sort();
            dirs.sort();

            for file in files {
                if items.len() >= limit {
                    return Ok(items);
                }
                items.push(self.relative_to_root(&file)?);
            }
            // 逆序入栈，保证按名称顺序深度优先
            pending.extend(dirs.into_iter().rev());
        }

        Ok(items)
    }

    /// 删除单个文件，目录不可删除。
    pub async fn delete_file(&self, target: &Path) -> Result<(), StorageError> {
        let metadata = match fs::metadata(target).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
            Err(err) => return Err(StorageError::Delete(err)),
        };
        if metadata.is_dir() {
            return Err(StorageError::IsDirectory);
        }
        match fs::remove_file(target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(StorageError::Delete(err)),
        }
    }
}

/// 不访问文件系统的前置校验：空名、绝对路径与 NUL 字节。
pub fn validate_relative(relative: &str) -> Result<(), StorageError> {
    if relative.is_empty() || relative.ends_with(['/', '\\']) {
        return Err(StorageError::InvalidFilename);
    }
    if relative.starts_with(['/', '\\']) {
        return Err(StorageError::AbsolutePath);
    }
    if relative.contains('\0') {
        return Err(StorageError::InvalidPath);
    }
    Ok(())
}

/// 仅按路径段深度判断是否越出基础目录，不访问文件系统。
pub fn check_lexical(relative: &str) -> Result<(), StorageError> {
    validate_relative(relative)?;
    let mut depth = 0usize;
    for component in Path::new(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or(StorageError::PathTraversal)?;
            }
            Component::Normal(_) => depth += 1,
            Component::RootDir | Component::Prefix(_) => return Err(StorageError::AbsolutePath),
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum StorageError {
    InvalidFilename,
    AbsolutePath,
    InvalidPath,
    PathTraversal,
    InvalidLimit,
    NotFound,
    IsDirectory,
    AlreadyExists,
    TooLarge { limit: u64 },
    Resolve(io::Error),
    Write(io::Error),
    Delete(io::Error),
    List(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::InvalidFilename => f.write_str("invalid filename"),
            StorageError::AbsolutePath => f.write_str("absolute paths are not allowed"),
            StorageError::InvalidPath => f.write_str("invalid path"),
            StorageError::PathTraversal => f.write_str("path traversal detected"),
            StorageError::InvalidLimit => f.write_str("limit must be between 1 and 2000"),
            StorageError::NotFound => f.write_str("file not found"),
            StorageError::IsDirectory => f.write_str("path is a directory"),
            StorageError::AlreadyExists => f.write_str("file already exists"),
            StorageError::TooLarge { limit } => write!(f, "file too large (max {limit} bytes)"),
            StorageError::Resolve(err) => write!(f, "path resolution failed: {err}"),
            StorageError::Write(err) => write!(f, "write failed: {err}"),
            StorageError::Delete(err) => write!(f, "delete failed: {err}"),
            StorageError::List(err) => write!(f, "list failed: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Resolve(err)
            | StorageError::Write(err)
            | StorageError::Delete(err)
            | StorageError::List(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Resolve(err)
    }
}
