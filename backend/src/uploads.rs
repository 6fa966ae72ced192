//! Invoice file storage for multipart purchase submissions

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use shared::validation::sanitize_file_name;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};

/// URL prefix the upload directory is served under
pub const PUBLIC_PREFIX: &str = "/uploads";

const MAX_NAME_ATTEMPTS: u32 = 100;

/// A file written to the upload directory
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub disk_path: PathBuf,
    /// Path recorded on the purchase, e.g. `/uploads/1704067200000_inv.pdf`
    pub public_path: String,
}

/// Name a stored file `{unix_millis}_{sanitized original name}`. Later attempts at the
/// same millisecond become `{unix_millis}-{attempt}_{name}`.
pub fn stored_file_name(original_name: &str, unix_millis: i64, attempt: u32) -> String {
    let name = sanitize_file_name(original_name);
    if attempt == 0 {
        format!("{}_{}", unix_millis, name)
    } else {
        format!("{}-{}_{}", unix_millis, attempt, name)
    }
}

/// Write an uploaded invoice into `dir` without replacing an existing file
pub async fn store_invoice(
    dir: &str,
    original_name: &str,
    bytes: &[u8],
) -> AppResult<StoredUpload> {
    store_invoice_at(dir, original_name, bytes, Utc::now().timestamp_millis()).await
}

async fn store_invoice_at(
    dir: &str,
    original_name: &str,
    bytes: &[u8],
    unix_millis: i64,
) -> AppResult<StoredUpload> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Internal(format!("Cannot create upload directory: {}", e)))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = stored_file_name(original_name, unix_millis, attempt);
        let disk_path = Path::new(dir).join(&file_name);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&disk_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(AppError::Internal(format!(
                    "Cannot store invoice file: {}",
                    e
                )))
            }
        };

        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&disk_path).await;
            return Err(AppError::Internal(format!("Cannot store invoice file: {}", e)));
        }

        tracing::debug!(path = %disk_path.display(), size = bytes.len(), "Invoice file stored");
        return Ok(StoredUpload {
            disk_path,
            public_path: format!("{}/{}", PUBLIC_PREFIX, file_name),
        });
    }

    Err(AppError::Internal(format!(
        "No free file name for invoice {}",
        original_name
    )))
}

/// Remove a stored invoice that no purchase references
pub async fn discard(upload: &StoredUpload) {
    if let Err(e) = tokio::fs::remove_file(&upload.disk_path).await {
        tracing::warn!(
            path = %upload.disk_path.display(),
            "Failed to remove orphaned upload: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("stockroom-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.to_string_lossy().to_string()
    }

    #[test]
    fn test_stored_file_name() {
        assert_eq!(
            stored_file_name("fatura ocak.pdf", 1704067200000, 0),
            "1704067200000_fatura_ocak.pdf"
        );
        assert_eq!(
            stored_file_name("fatura ocak.pdf", 1704067200000, 2),
            "1704067200000-2_fatura_ocak.pdf"
        );
    }

    #[tokio::test]
    async fn test_store_and_discard() {
        let dir = temp_dir("uploads");

        let upload = store_invoice(&dir, "inv 1.pdf", b"%PDF-1.4").await.unwrap();
        assert!(upload.public_path.starts_with("/uploads/"));
        assert!(upload.public_path.ends_with("_inv_1.pdf"));
        assert_eq!(tokio::fs::read(&upload.disk_path).await.unwrap(), b"%PDF-1.4");

        discard(&upload).await;
        assert!(!upload.disk_path.exists());
    }

    #[tokio::test]
    async fn test_same_millisecond_uploads_do_not_overwrite() {
        let dir = temp_dir("collide");

        let first = store_invoice_at(&dir, "inv.pdf", b"first", 1704067200000)
            .await
            .unwrap();
        let second = store_invoice_at(&dir, "inv.pdf", b"second", 1704067200000)
            .await
            .unwrap();

        assert_eq!(first.public_path, "/uploads/1704067200000_inv.pdf");
        assert_eq!(second.public_path, "/uploads/1704067200000-1_inv.pdf");
        assert_eq!(tokio::fs::read(&first.disk_path).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&second.disk_path).await.unwrap(), b"second");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
