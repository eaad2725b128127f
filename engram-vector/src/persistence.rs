//! Atomic JSON persistence: write to `<target>.tmp`, then rename over
//! the target. A stale tmp file from a prior crash is simply
//! overwritten.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use engram_core::errors::{EngramResult, StoreError};
use engram_core::memory::MemoryRecord;

/// On-disk shape of `vectors.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VectorsFile {
    pub records: HashMap<String, MemoryRecord>,
}

/// On-disk shape of `index.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IndexFile {
    pub by_user: HashMap<String, Vec<String>>,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn write_atomic(path: &Path, json: String) -> EngramResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::PersistenceFailed {
                reason: format!("create {}: {e}", parent.display()),
            })?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json.as_bytes())
        .await
        .map_err(|e| StoreError::PersistenceFailed {
            reason: format!("write {}: {e}", tmp.display()),
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::PersistenceFailed {
            reason: format!("rename {} -> {}: {e}", tmp.display(), path.display()),
        })?;
    Ok(())
}

/// Persist both files atomically.
pub async fn save(
    vectors_path: &Path,
    index_path: &Path,
    vectors: &VectorsFile,
    index: &IndexFile,
) -> EngramResult<()> {
    let vectors_json =
        serde_json::to_string(vectors).map_err(|e| StoreError::PersistenceFailed {
            reason: format!("serialize vectors: {e}"),
        })?;
    let index_json = serde_json::to_string(index).map_err(|e| StoreError::PersistenceFailed {
        reason: format!("serialize index: {e}"),
    })?;

    write_atomic(vectors_path, vectors_json).await?;
    write_atomic(index_path, index_json).await?;
    Ok(())
}

/// Load both files; missing files yield an empty store.
pub async fn load(vectors_path: &Path, index_path: &Path) -> EngramResult<(VectorsFile, IndexFile)> {
    let vectors = match tokio::fs::read_to_string(vectors_path).await {
        Ok(s) => serde_json::from_str(&s).map_err(|e| StoreError::PersistenceFailed {
            reason: format!("parse {}: {e}", vectors_path.display()),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => VectorsFile::default(),
        Err(e) => {
            return Err(StoreError::PersistenceFailed {
                reason: format!("read {}: {e}", vectors_path.display()),
            }
            .into())
        }
    };

    let index = match tokio::fs::read_to_string(index_path).await {
        Ok(s) => serde_json::from_str(&s).map_err(|e| StoreError::PersistenceFailed {
            reason: format!("parse {}: {e}", index_path.display()),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexFile::default(),
        Err(e) => {
            return Err(StoreError::PersistenceFailed {
                reason: format!("read {}: {e}", index_path.display()),
            }
            .into())
        }
    };

    Ok((vectors, index))
}
