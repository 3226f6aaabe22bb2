use std::{fmt, io};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, StreamExt};
use reqwest::{
    multipart::{Form, Part},
    Body, Client,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::config::ClientSettings;

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// A file picked by the user, held in memory until its upload finishes.
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Progress {
        bytes_transferred: u64,
        total_bytes: u64,
    },
    Completed {
        url: String,
    },
    Failed {
        reason: String,
    },
}

impl UploadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

pub type UploadStream = BoxStream<'static, UploadEvent>;

/// Object storage receiving avatar uploads.
///
/// The returned stream yields progress in non-decreasing order and ends with
/// exactly one `Completed` or `Failed` event.
pub trait BlobStore: Send + Sync {
    fn upload(&self, file: SelectedFile, destination_key: String) -> UploadStream;
}

/// `round(transferred / total * 100)`, clamped to 0..=100. An empty transfer counts as done.
pub fn progress_percent(bytes_transferred: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return 100;
    }
    let percent = (bytes_transferred as f64 / total_bytes as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

pub fn avatar_destination_key(file_name: &str, now: DateTime<Utc>) -> String {
    format!("avatars/{}-{}", now.timestamp_millis(), file_name)
}

#[derive(Debug, Deserialize)]
struct PresetUploadResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    error: Option<PresetUploadError>,
}

#[derive(Debug, Deserialize)]
struct PresetUploadError {
    message: String,
}

/// Posts avatars as `multipart/form-data` to an unsigned-preset image upload endpoint.
#[derive(Clone)]
pub struct PresetBlobStore {
    http: Client,
    upload_url: String,
    upload_preset: String,
    cloud_name: Option<String>,
    chunk_bytes: usize,
}

impl PresetBlobStore {
    pub fn new(
        http: Client,
        upload_url: impl Into<String>,
        upload_preset: impl Into<String>,
    ) -> Self {
        Self {
            http,
            upload_url: upload_url.into(),
            upload_preset: upload_preset.into(),
            cloud_name: None,
            chunk_bytes: UPLOAD_CHUNK_BYTES,
        }
    }

    pub fn from_settings(http: Client, settings: &ClientSettings) -> Self {
        Self::new(http, settings.upload_url(), settings.upload_preset.clone())
            .with_cloud_name(settings.cloud_name.clone())
    }

    pub fn with_cloud_name(mut self, cloud_name: impl Into<String>) -> Self {
        self.cloud_name = Some(cloud_name.into());
        self
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    async fn post_multipart(
        &self,
        file: SelectedFile,
        destination_key: String,
        progress: mpsc::UnboundedSender<UploadEvent>,
    ) -> Result<String> {
        let total_bytes = file.size();
        let chunks: Vec<Vec<u8>> = file
            .bytes
            .chunks(self.chunk_bytes)
            .map(<[u8]>::to_vec)
            .collect();

        let mut bytes_transferred = 0u64;
        let body = futures::stream::iter(chunks).map(move |chunk| {
            bytes_transferred += chunk.len() as u64;
            let _ = progress.send(UploadEvent::Progress {
                bytes_transferred,
                total_bytes,
            });
            Ok::<_, io::Error>(chunk)
        });

        let part = Part::stream_with_length(Body::wrap_stream(body), total_bytes)
            .file_name(file.name)
            .mime_str(&file.mime_type)
            .context("invalid mime type for upload")?;
        let mut form = Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .text("public_id", destination_key);
        if let Some(cloud_name) = &self.cloud_name {
            form = form.text("cloud_name", cloud_name.clone());
        }
        let form = form.part("file", part);

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("upload request failed")?;
        let status = response.status();
        let reply: PresetUploadResponse = response
            .json()
            .await
            .with_context(|| format!("unreadable upload response (status {status})"))?;

        match (reply.secure_url, reply.error) {
            (Some(url), _) => Ok(url),
            (None, Some(err)) => Err(anyhow!("upload rejected: {}", err.message)),
            (None, None) => Err(anyhow!("upload response missing secure_url (status {status})")),
        }
    }
}

impl BlobStore for PresetBlobStore {
    fn upload(&self, file: SelectedFile, destination_key: String) -> UploadStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        tokio::spawn(async move {
            let file_name = file.name.clone();
            let terminal = match store
                .post_multipart(file, destination_key.clone(), tx.clone())
                .await
            {
                Ok(url) => {
                    info!(file = %file_name, key = %destination_key, "avatar uploaded");
                    UploadEvent::Completed { url }
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(
                        file = %file_name,
                        key = %destination_key,
                        error = %reason,
                        "avatar upload failed"
                    );
                    UploadEvent::Failed { reason }
                }
            };
            let _ = tx.send(terminal);
        });
        UnboundedReceiverStream::new(rx).boxed()
    }
}

#[cfg(test)]
#[path = "tests/blob_tests.rs"]
mod tests;
