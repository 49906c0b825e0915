//! Object storage for uploaded media
//!
//! Providers fetch images and videos from a public URL, so uploads are
//! written to a store first and the resulting URL is handed to the adapter.
//! Stores are constructed once and injected where needed.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{DbError, OmnicastError, Result};
use crate::types::{MediaUpload, PreparedMedia};

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist an upload and return where providers can fetch it
    async fn put(&self, tenant_id: &str, upload: &MediaUpload) -> Result<PreparedMedia>;

    /// Delete media that no published post refers to
    async fn remove(&self, media: &PreparedMedia) -> Result<()>;
}

/// Stores media on the local filesystem, published under `public_base_url`
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalMediaStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

fn extension_for(content_type: &str, file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .or_else(|| {
            mime_guess::get_mime_extensions_str(content_type)
                .and_then(|exts| exts.first())
                .map(|e| e.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}

fn tenant_segment(tenant_id: &str) -> String {
    tenant_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(&self, tenant_id: &str, upload: &MediaUpload) -> Result<PreparedMedia> {
        if upload.bytes.is_empty() {
            return Err(OmnicastError::InvalidInput(format!(
                "Uploaded file '{}' is empty",
                upload.file_name
            )));
        }

        let content_type = upload.effective_content_type();
        let kind = crate::types::MediaKind::from_content_type(&content_type).ok_or_else(|| {
            OmnicastError::InvalidInput(format!(
                "Unsupported media type '{}': only images and videos can be published",
                content_type
            ))
        })?;

        let segment = tenant_segment(tenant_id);
        let file_name = format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            extension_for(&content_type, &upload.file_name)
        );
        let tenant_dir = self.dir.join(&segment);
        tokio::fs::create_dir_all(&tenant_dir)
            .await
            .map_err(DbError::IoError)?;
        tokio::fs::write(tenant_dir.join(&file_name), &upload.bytes)
            .await
            .map_err(DbError::IoError)?;

        let public_url = format!("{}/{}/{}", self.public_base_url, segment, file_name);
        tracing::debug!(
            "Stored {} bytes of {} for tenant {} at {}",
            upload.bytes.len(),
            content_type,
            tenant_id,
            public_url
        );

        Ok(PreparedMedia {
            public_url,
            content_type,
            kind,
            bytes: upload.bytes.clone(),
        })
    }

    async fn remove(&self, media: &PreparedMedia) -> Result<()> {
        let Some(path) = self.path_for(&media.public_url) else {
            tracing::debug!("{} is not stored here, nothing to remove", media.public_url);
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed unused media {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DbError::IoError(e).into()),
        }
    }
}

impl LocalMediaStore {
    /// File behind a URL this store handed out (`<base>/<tenant>/<file>`)
    fn path_for(&self, public_url: &str) -> Option<PathBuf> {
        let relative = public_url
            .strip_prefix(&self.public_base_url)?
            .strip_prefix('/')?;
        let (segment, file_name) = relative.split_once('/')?;
        let safe = |part: &str| {
            !part.is_empty()
                && !part.starts_with('.')
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !safe(segment) || !safe(file_name) {
            return None;
        }
        Some(self.dir.join(segment).join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use tempfile::TempDir;

    fn upload(name: &str, content_type: &str) -> MediaUpload {
        MediaUpload {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn test_put_writes_under_tenant_dir() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalMediaStore::new(temp_dir.path(), "https://cdn.example.com/media/");

        let prepared = store
            .put("tenant-1", &upload("photo.JPG", "image/jpeg"))
            .await
            .unwrap();

        assert_eq!(prepared.kind, MediaKind::Image);
        assert!(prepared
            .public_url
            .starts_with("https://cdn.example.com/media/tenant-1/"));
        assert!(prepared.public_url.ends_with(".jpg"));

        let file_name = prepared.public_url.rsplit('/').next().unwrap();
        let on_disk = temp_dir.path().join("tenant-1").join(file_name);
        assert_eq!(std::fs::read(on_disk).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_content_type_guessed_from_name() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalMediaStore::new(temp_dir.path(), "http://localhost/media");

        let prepared = store
            .put("t", &upload("clip.mp4", "application/octet-stream"))
            .await
            .unwrap();
        assert_eq!(prepared.kind, MediaKind::Video);
        assert_eq!(prepared.content_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_rejects_non_media_and_empty_uploads() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalMediaStore::new(temp_dir.path(), "http://localhost/media");

        let err = store
            .put("t", &upload("notes.pdf", "application/pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, OmnicastError::InvalidInput(_)));

        let mut empty = upload("a.png", "image/png");
        empty.bytes.clear();
        assert!(store.put("t", &empty).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_deletes_stored_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalMediaStore::new(temp_dir.path(), "http://localhost/media");

        let prepared = store.put("tenant-1", &upload("a.png", "image/png")).await.unwrap();
        let file_name = prepared.public_url.rsplit('/').next().unwrap().to_string();
        let on_disk = temp_dir.path().join("tenant-1").join(&file_name);
        assert!(on_disk.exists());

        store.remove(&prepared).await.unwrap();
        assert!(!on_disk.exists());
        // Removing twice is fine
        store.remove(&prepared).await.unwrap();
    }

    #[test]
    fn test_path_for_only_accepts_own_urls() {
        let store = LocalMediaStore::new("/srv/media", "http://localhost/media");
        assert_eq!(
            store.path_for("http://localhost/media/t1/abc.png"),
            Some(PathBuf::from("/srv/media/t1/abc.png"))
        );
        assert_eq!(store.path_for("https://elsewhere.example.com/t1/abc.png"), None);
        assert_eq!(store.path_for("http://localhost/media/../etc/passwd"), None);
        assert_eq!(store.path_for("http://localhost/media/t1/x/y.png"), None);
    }

    #[test]
    fn test_tenant_segment_is_path_safe() {
        assert_eq!(tenant_segment("../etc"), "___etc");
        assert_eq!(tenant_segment("user_1-a"), "user_1-a");
    }
}
