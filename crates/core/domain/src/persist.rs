//! 本地持久化文件读写。
//!
//! 所有写入均为“先写临时文件再 rename”，并发读者（VPN 客户端进程、重启后的本进程）
//! 只会看到完整的旧内容或完整的新内容。

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// 持久化错误。
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(".{}.tmp.{}.{}", name, std::process::id(), seq))
}

/// 原子写入字节。
pub fn write_atomic(dest: &Path, data: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| PersistError::io(parent, err))?;
        }
    }
    let tmp = temp_path_for(dest);
    let written = (|| {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(data)?;
        file.sync_all()
    })();
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp);
        return Err(PersistError::io(&tmp, err));
    }
    fs::rename(&tmp, dest).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        PersistError::io(dest, err)
    })
}

/// 原子写入 JSON。
pub fn write_json_atomic<T: Serialize>(dest: &Path, value: &T) -> Result<(), PersistError> {
    let data = serde_json::to_vec_pretty(value).map_err(|err| PersistError::json(dest, err))?;
    write_atomic(dest, &data)
}

/// 读取文本；文件不存在或内容为空时返回 `None`。
pub fn read_text(path: &Path) -> Result<Option<String>, PersistError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PersistError::io(path, err)),
    }
}

/// 读取 JSON；文件不存在或为空时返回 `None`，内容损坏时返回错误。
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let Some(text) = read_text(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|err| PersistError::json(path, err))
}

/// 删除文件（不存在时视为成功）。
pub fn remove_if_exists(path: &Path) -> Result<(), PersistError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PersistError::io(path, err)),
    }
}

/// 文件存在且非空。
pub fn exists_and_not_empty(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
