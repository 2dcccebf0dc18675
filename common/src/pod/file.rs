//! Local filesystem pod backend.
//!
//! Keys map to nested directories under a root path. Publishing is atomic:
//! data is written to a temp file next to its destination and renamed into
//! place, so a reader never observes a half-written blob.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::{Pod, PodError, PodResult};

#[derive(Debug)]
pub struct FilePod {
    root: PathBuf,
}

impl FilePod {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty() && *p != ".") {
            path.push(part);
        }
        path
    }

    fn io(err: std::io::Error) -> PodError {
        PodError::Io(err.to_string())
    }
}

#[async_trait]
impl Pod for FilePod {
    fn uri(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn get(&self, key: &str) -> PodResult<Bytes> {
        tracing::debug!(pod = "file", key, "READ");
        match tokio::fs::read(self.full(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(PodError::NotFound(key.to_string()))
            }
            Err(err) => Err(Self::io(err)),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> PodResult<()> {
        let path = self.full(key);
        if tokio::fs::try_exists(&path).await.map_err(Self::io)? {
            tracing::debug!(pod = "file", key, "SKIP-WRITE");
            return Ok(());
        }
        tracing::debug!(pod = "file", key, "WRITE");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(Self::io)?;
        }
        // Write-to-temp then rename keeps the publish atomic. The suffix
        // is appended (revision keys legitimately contain dots).
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".tmp-{}", Uuid::new_v4().simple()));
        let tmp = std::path::PathBuf::from(tmp);
        tokio::fs::write(&tmp, &data).await.map_err(Self::io)?;
        tokio::fs::rename(&tmp, &path).await.map_err(Self::io)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> PodResult<Vec<String>> {
        tracing::debug!(pod = "file", prefix, "LIST");
        let path = self.full(prefix);
        let mut reader = match tokio::fs::read_dir(&path).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(Self::io(err)),
        };
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(Self::io)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.contains(".tmp-") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn walk(&self, prefix: &str) -> PodResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending: Vec<String> = vec![prefix.to_string()];
        while let Some(current) = pending.pop() {
            let path = self.full(&current);
            if is_dir(&path).await {
                for name in self.list(&current).await? {
                    pending.push(super::join(&current, &name));
                }
            } else if tokio::fs::try_exists(&path).await.map_err(Self::io)? {
                keys.push(current);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> PodResult<()> {
        tracing::debug!(pod = "file", key, "REMOVE");
        match tokio::fs::remove_file(self.full(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::io(err)),
        }
    }

    async fn modified(&self, key: &str) -> PodResult<Option<SystemTime>> {
        match tokio::fs::metadata(self.full(key)).await {
            Ok(meta) => Ok(meta.modified().ok()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io(err)),
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
