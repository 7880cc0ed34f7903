use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use assetmap_core::domain::asset::ImageRef;
use assetmap_core::storage::{ObjectStore, StoreError};

/// Stores uploaded images as files under `<root>/<bucket>` and hands out URLs below
/// `<public_base_url>/<bucket>`, which the server maps back onto the same directory.
#[derive(Clone, Debug)]
pub struct FilesystemObjectStore {
    dir: PathBuf,
    base_url: String,
}

impl FilesystemObjectStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str, public_base_url: &str) -> Self {
        Self {
            dir: root.as_ref().join(bucket),
            base_url: format!("{}/{bucket}", public_base_url.trim_end_matches('/')),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn object_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::Backend(format!("invalid object name `{name}`")));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<ImageRef, StoreError> {
        let path = self.object_path(name)?;
        fs::create_dir_all(&self.dir).await.map_err(|error| {
            StoreError::Unavailable(format!("could not create `{}`: {error}", self.dir.display()))
        })?;

        let mut file =
            fs::OpenOptions::new().write(true).create_new(true).open(&path).await.map_err(
                |error| match error.kind() {
                    ErrorKind::AlreadyExists => {
                        StoreError::Conflict(format!("object `{name}` already exists"))
                    }
                    _ => StoreError::Backend(format!("could not open `{name}`: {error}")),
                },
            )?;
        file.write_all(&bytes)
            .await
            .map_err(|error| StoreError::Backend(format!("could not write `{name}`: {error}")))?;
        file.flush()
            .await
            .map_err(|error| StoreError::Backend(format!("could not flush `{name}`: {error}")))?;

        tracing::debug!(
            event_name = "object.stored",
            object = name,
            content_type,
            bytes = bytes.len(),
            "object stored"
        );
        Ok(self.public_url(name))
    }

    fn public_url(&self, name: &str) -> ImageRef {
        ImageRef(format!("{}/{name}", self.base_url))
    }
}
