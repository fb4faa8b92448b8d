use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;

pub const PROFILE_PHOTO: &str = "profile_photo";
pub const COVER_PHOTO: &str = "cover_photo";

/// Temp files written for the register form's file fields.
#[derive(Debug, Default)]
pub struct ReceivedUploads {
    pub profile_photo: Option<PathBuf>,
    pub cover_photo: Option<PathBuf>,
}

impl ReceivedUploads {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.profile_photo
            .iter()
            .chain(self.cover_photo.iter())
            .map(PathBuf::as_path)
    }

    /// Slot for a file field, or `None` if the field name is not accepted.
    pub fn slot_mut(&mut self, field: &str) -> Option<&mut Option<PathBuf>> {
        match field {
            PROFILE_PHOTO => Some(&mut self.profile_photo),
            COVER_PHOTO => Some(&mut self.cover_photo),
            _ => None,
        }
    }

    /// Removes whatever temp files still exist. Files the media client already
    /// moved away are skipped silently.
    pub async fn discard(&self) {
        for path in self.paths() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "temp upload removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, path = %path.display(), "remove temp upload failed"),
            }
        }
    }
}

/// Streams a multipart file field into `dir` under a unique name that keeps
/// the client's extension.
pub async fn save_field(dir: &Path, mut field: Field<'_>) -> Result<PathBuf, AppError> {
    let prefix = field.name().unwrap_or("file").to_string();
    let ext = field.file_name().and_then(extension_of);
    let name = match ext {
        Some(ext) => format!("{}-{}.{}", prefix, Uuid::new_v4(), ext),
        None => format!("{}-{}", prefix, Uuid::new_v4()),
    };
    let path = dir.join(name);

    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| anyhow::Error::new(e).context("create temp upload"))?;

    let written = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| anyhow::Error::new(e).context("write temp upload"))?;
        }
        file.flush()
            .await
            .map_err(|e| anyhow::Error::new(e).context("flush temp upload"))?;
        Ok::<(), AppError>(())
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }
    debug!(path = %path.display(), "temp upload stored");
    Ok(path)
}

fn extension_of(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_sanitized() {
        assert_eq!(extension_of("me.PNG").as_deref(), Some("png"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("evil.p/h"), None);
        assert_eq!(extension_of("x.averyverylongext"), None);
    }

    #[test]
    fn only_known_fields_have_slots() {
        let mut uploads = ReceivedUploads::default();
        assert!(uploads.slot_mut(PROFILE_PHOTO).is_some());
        assert!(uploads.slot_mut(COVER_PHOTO).is_some());
        assert!(uploads.slot_mut("avatar").is_none());
    }

    #[tokio::test]
    async fn discard_removes_existing_and_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.png");
        tokio::fs::write(&present, b"x").await.unwrap();

        let uploads = ReceivedUploads {
            profile_photo: Some(present.clone()),
            cover_photo: Some(dir.path().join("gone.png")),
        };
        uploads.discard().await;
        assert!(!present.exists());
    }
}
