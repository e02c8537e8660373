//! HTTP media upload client.
//!
//! Media is uploaded to the server before the chat frame referencing it is
//! sent; the frame then carries the durable URL the server returned.

use std::time::Duration;

use reqwest::multipart;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upload rejected (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("upload response missing url")]
    MissingUrl,
}

/// A media attachment as captured locally, before upload.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub mimetype: String,
    pub filename: String,
    pub caption: Option<String>,
}

/// Server-side location of an uploaded attachment.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub url: String,
}

pub struct MediaUploader {
    http: reqwest::Client,
    base_url: String,
}

impl MediaUploader {
    /// Creates an uploader against `base_url` (scheme + host, no trailing
    /// path). Panics only if the TLS backend cannot initialize.
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to create HTTP client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Uploads one attachment destined for `to` and returns its durable URL.
    pub async fn upload(&self, media: &MediaUpload, to: &str) -> Result<StoredMedia, UploadError> {
        let part = multipart::Part::bytes(media.bytes.clone())
            .file_name(media.filename.clone())
            .mime_str(&media.mimetype)?;
        let mut form = multipart::Form::new()
            .part("file", part)
            .text("to", to.to_string());
        if let Some(caption) = &media.caption {
            form = form.text("caption", caption.clone());
        }

        let response = self
            .http
            .post(format!("{}/api/chat/upload-media", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // The server reports failures as {"error": "..."}; fall back to
            // the raw body for anything else.
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
                .unwrap_or(body);
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: Value = serde_json::from_str(&body).map_err(|_| UploadError::MissingUrl)?;
        let url = parsed
            .get("url")
            .and_then(Value::as_str)
            .ok_or(UploadError::MissingUrl)?;
        Ok(StoredMedia {
            url: url.to_string(),
        })
    }
}
