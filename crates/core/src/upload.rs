use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::domain::asset::ImageRef;
use crate::storage::ObjectStore;

pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UploadError {
    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("`{0}` is not an image content type")]
    UnsupportedContentType(String),
    #[error("upload did not finish within {0}s")]
    TimedOut(u64),
    #[error("object store rejected the upload: {0}")]
    Store(String),
    #[error("upload task failed: {0}")]
    Task(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub index: usize,
    pub file_name: String,
    pub object_name: String,
    pub url: ImageRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub index: usize,
    pub file_name: String,
    pub error: UploadError,
}

/// Outcome of one batch, both lists ordered by the file's position in the batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedImage>,
    pub failures: Vec<UploadFailure>,
}

impl UploadReport {
    pub fn image_refs(&self) -> Vec<ImageRef> {
        self.uploaded.iter().map(|image| image.url.clone()).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
    pub timeout: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone)]
pub struct ImageUploader {
    store: Arc<dyn ObjectStore>,
    limits: UploadLimits,
}

impl ImageUploader {
    pub fn new(store: Arc<dyn ObjectStore>, limits: UploadLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Uploads every file concurrently. A failing file never cancels its siblings.
    pub async fn upload_batch(&self, files: Vec<UploadFile>) -> UploadReport {
        let mut report = UploadReport::default();
        let mut tasks = JoinSet::new();

        for (index, file) in files.into_iter().enumerate() {
            if let Err(error) = self.precheck(&file) {
                report.failures.push(UploadFailure { index, file_name: file.file_name, error });
                continue;
            }

            let store = Arc::clone(&self.store);
            let timeout = self.limits.timeout;
            tasks.spawn(async move {
                let object_name = object_name(&file.file_name, &file.content_type);
                let upload = store.upload(&object_name, file.bytes, &file.content_type);
                let result = match tokio::time::timeout(timeout, upload).await {
                    Ok(Ok(url)) => Ok(UploadedImage {
                        index,
                        file_name: file.file_name.clone(),
                        object_name,
                        url,
                    }),
                    Ok(Err(error)) => Err(UploadError::Store(error.to_string())),
                    Err(_) => Err(UploadError::TimedOut(timeout.as_secs())),
                };
                (index, file.file_name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(image))) => report.uploaded.push(image),
                Ok((index, file_name, Err(error))) => {
                    tracing::warn!(
                        event_name = "upload.file_failed",
                        index,
                        file_name = %file_name,
                        error = %error,
                        "image upload failed"
                    );
                    report.failures.push(UploadFailure { index, file_name, error });
                }
                Err(error) => {
                    tracing::error!(
                        event_name = "upload.task_failed",
                        error = %error,
                        "image upload task did not complete"
                    );
                    report.failures.push(UploadFailure {
                        index: usize::MAX,
                        file_name: String::new(),
                        error: UploadError::Task(error.to_string()),
                    });
                }
            }
        }

        report.uploaded.sort_by_key(|image| image.index);
        report.failures.sort_by_key(|failure| failure.index);
        report
    }

    fn precheck(&self, file: &UploadFile) -> Result<(), UploadError> {
        if !file.content_type.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(UploadError::UnsupportedContentType(file.content_type.clone()));
        }
        let size = file.bytes.len() as u64;
        if size > self.limits.max_file_bytes {
            return Err(UploadError::TooLarge { size, limit: self.limits.max_file_bytes });
        }
        Ok(())
    }
}

/// `<unix-millis>-<random base36>.<ext>`
pub fn object_name(file_name: &str, content_type: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix = (0..8)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect::<String>();
    format!("{}-{suffix}.{}", Utc::now().timestamp_millis(), extension(file_name, content_type))
}

fn extension(file_name: &str, content_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext;
    }

    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg".to_string(),
        "image/png" => "png".to_string(),
        "image/gif" => "gif".to_string(),
        "image/webp" => "webp".to_string(),
        "image/heic" => "heic".to_string(),
        _ => "bin".to_string(),
    }
}
