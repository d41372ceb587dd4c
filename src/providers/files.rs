//! File upload and inline-image collaborators.
//!
//! These prepare content parts for the chat path: uploads exchange a local
//! file for a remote file id, inline images embed the bytes as a data URI.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::join_all;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::errors::{ChatError, ChatResult};
use crate::events::ChatEvent;
use crate::models::content::{ContentPart, ImageDetail};

use super::openai::OpenAiProvider;

const MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;
const MAX_INLINE_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

const SUPPORTED_UPLOAD_MIME: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
];

const INLINE_IMAGE_MIME: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub file_id: String,
    pub mime_type: String,
}

impl OpenAiProvider {
    /// Upload one file for use in chat, returning its remote id.
    ///
    /// Oversize files are rejected; an unlisted MIME type is only a warning
    /// since the remote side may still accept it.
    pub async fn upload_file(
        &self,
        path: &Path,
        display_name: Option<&str>,
    ) -> ChatResult<UploadedFile> {
        let size = file_size(path).await?;
        if size > MAX_UPLOAD_BYTES {
            return Err(ChatError::File(format!(
                "{} exceeds the 32MB upload limit",
                path.display()
            )));
        }

        let mime_type = detect_mime(path, "application/octet-stream");
        if !SUPPORTED_UPLOAD_MIME.contains(&mime_type.as_str()) {
            self.sink().emit(&ChatEvent::UploadMimeUnlisted {
                path: path.display().to_string(),
                mime_type: mime_type.clone(),
            });
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ChatError::File(format!("cannot read {}: {e}", path.display())))?;
        let name = display_name
            .map(str::to_string)
            .or_else(|| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "file".to_string());

        let part = Part::bytes(data)
            .file_name(name)
            .mime_str(&mime_type)
            .map_err(|e| ChatError::File(e.to_string()))?;
        let form = Form::new().text("purpose", "user_data").part("file", part);

        let url = format!("{}/v1/files", self.config().host.trim_end_matches('/'));
        let response = self
            .client()
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config().api_key),
            )
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::Transport(format!(
                "upload failed: {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        let file_id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChatError::Transport(format!("upload response has no id: {body}")))?;

        self.sink().emit(&ChatEvent::FileUploaded {
            path: path.display().to_string(),
            file_id: file_id.to_string(),
        });
        Ok(UploadedFile {
            file_id: file_id.to_string(),
            mime_type,
        })
    }

    /// Upload many files concurrently.
    ///
    /// Results come back in input order and one file's failure does not
    /// cancel its siblings.
    pub async fn upload_files(
        &self,
        paths: &[&Path],
        display_names: Option<&[&str]>,
    ) -> ChatResult<Vec<ChatResult<UploadedFile>>> {
        if paths.is_empty() {
            return Err(ChatError::Validation {
                parameter: "paths",
                reason: "file path list must not be empty".into(),
            });
        }
        if let Some(names) = display_names {
            if names.len() != paths.len() {
                return Err(ChatError::Validation {
                    parameter: "display_names",
                    reason: "display_names length must match paths".into(),
                });
            }
        }

        let uploads = paths.iter().enumerate().map(|(idx, path)| {
            let name = display_names.map(|names| names[idx]);
            self.upload_file(path, name)
        });
        Ok(join_all(uploads).await)
    }

    /// Embed a local image as a base64 data-URI content part.
    pub async fn inline_image(&self, path: &Path, detail: ImageDetail) -> ChatResult<ContentPart> {
        let size = file_size(path).await?;
        if size > MAX_INLINE_IMAGE_BYTES {
            return Err(ChatError::File(format!(
                "{} exceeds the 20MB inline image limit",
                path.display()
            )));
        }

        let mut mime_type = detect_mime(path, "image/jpeg");
        if !INLINE_IMAGE_MIME.contains(&mime_type.as_str()) {
            self.sink().emit(&ChatEvent::InlineImageFallback {
                path: path.display().to_string(),
                mime_type: mime_type.clone(),
            });
            mime_type = "image/jpeg".to_string();
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ChatError::File(format!("cannot read {}: {e}", path.display())))?;
        let url = format!("data:{mime_type};base64,{}", BASE64.encode(data));
        Ok(ContentPart::image(url, detail))
    }

    /// Embed several images, preserving order. Failures stay per-image.
    pub async fn inline_images(
        &self,
        paths: &[&Path],
        detail: ImageDetail,
    ) -> ChatResult<Vec<ChatResult<ContentPart>>> {
        if paths.is_empty() {
            return Err(ChatError::Validation {
                parameter: "paths",
                reason: "image path list must not be empty".into(),
            });
        }

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.inline_image(path, detail).await);
        }
        Ok(results)
    }
}

async fn file_size(path: &Path) -> ChatResult<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ChatError::File(format!("{} is not readable: {e}", path.display())))?;
    Ok(metadata.len())
}

fn detect_mime(path: &Path, fallback: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(fallback)
        .to_string()
}
