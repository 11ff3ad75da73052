use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use tribute_types::models::UploadedFile;

/// Blob storage capability. Uploads return the storage key and a public URL;
/// deletes take the key parsed back from that URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<UploadedFile>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Parses an uploaded file's storage key from its public URL. The key is the
/// last path segment.
pub fn file_name_from_url(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Filesystem-backed blob store: payloads land under the upload directory
/// and are served at `{base_url}/uploads/{name}`.
pub struct LocalBlobStore {
    dir: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub async fn new(dir: PathBuf, base_url: String) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        info!("Blob store ready at {}", dir.display());
        Ok(Self { dir, base_url })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, bytes: &[u8], mime_type: &str) -> Result<UploadedFile> {
        let name = Uuid::new_v4().to_string();
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(UploadedFile {
            url: format!("{}/uploads/{}", self.base_url, name),
            name,
            mime_type: mime_type.to_string(),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            // already gone is fine
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_comes_from_last_url_segment() {
        assert_eq!(
            file_name_from_url("http://localhost:3000/uploads/abc-123"),
            "abc-123"
        );
        assert_eq!(file_name_from_url("abc-123"), "abc-123");
    }

    #[tokio::test]
    async fn upload_then_delete_roundtrip() {
        let dir = std::env::temp_dir().join(format!("tribute-test-{}", Uuid::new_v4()));
        let store = LocalBlobStore::new(dir.clone(), "http://localhost:3000".into())
            .await
            .unwrap();

        let meta = store.upload(b"payload", "image/jpeg").await.unwrap();
        assert_eq!(meta.mime_type, "image/jpeg");
        assert!(meta.url.ends_with(&meta.name));

        let on_disk = tokio::fs::read(dir.join(&meta.name)).await.unwrap();
        assert_eq!(on_disk, b"payload");

        store.delete(&meta.name).await.unwrap();
        // deleting again is a no-op
        store.delete(&meta.name).await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
