//! Image uploads to the hosted CDN.
//!
//! Files are validated locally (type, size), then sent as an authenticated
//! multipart upload. Transient failures are retried with exponential backoff;
//! credential, configuration and request errors fail immediately.

mod error;
mod retry;
mod transform;

pub use error::MediaError;
pub use retry::{retry_with_backoff, RetryError, RetryPolicy, Retryable};
pub use transform::{transform_url, CropMode, ImageFormat, ImageTransform};

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MediaConfig;

/// An image stored on the CDN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
    pub file_id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Success body of the upload endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Error body of the upload endpoint
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Client for the image CDN
pub struct MediaClient {
    http: reqwest::Client,
    config: MediaConfig,
    policy: RetryPolicy,
}

impl MediaClient {
    pub fn new(config: MediaConfig) -> Result<Self, MediaError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MediaError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        let policy = RetryPolicy::from(&config.retry);

        Ok(Self {
            http,
            config,
            policy,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Local checks before any network call
    pub fn validate(&self, content_type: &str, size: u64) -> Result<(), MediaError> {
        if !self.config.is_type_allowed(content_type) {
            return Err(MediaError::UnsupportedType {
                content_type: content_type.to_string(),
            });
        }
        if size == 0 {
            return Err(MediaError::BadRequest {
                status: 400,
                message: "The file is empty".to_string(),
            });
        }
        if size > self.config.max_file_size {
            return Err(MediaError::FileTooLarge {
                message: format!(
                    "{} bytes exceeds the {} MB limit",
                    size,
                    self.config.max_file_size / 1024 / 1024
                ),
            });
        }
        Ok(())
    }

    /// Upload an image, retrying transient failures
    pub async fn upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadedImage, MediaError> {
        if !self.is_configured() {
            return Err(MediaError::Config {
                message: "media private_key, upload_url and url_endpoint must be set".to_string(),
            });
        }
        self.validate(content_type, bytes.len() as u64)?;

        let stored_name = format!("{}.{}", Uuid::new_v4(), extension_for(file_name, content_type));
        debug!(file_name, stored_name = %stored_name, size = bytes.len(), "Uploading image");

        let result = retry_with_backoff(&self.policy, |attempt| {
            debug!(attempt, "Upload attempt");
            self.upload_once(&stored_name, &bytes, content_type)
        })
        .await;

        match result {
            Ok(image) => {
                info!(file_id = %image.file_id, url = %image.url, "Image uploaded");
                Ok(image)
            }
            Err(RetryError::Aborted { error, .. }) => Err(error),
            Err(RetryError::RetriesExhausted { attempts, last }) => Err(MediaError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Append a transformation to a CDN URL
    pub fn transform_url(&self, url: &str, transform: &ImageTransform) -> String {
        transform_url(url, transform)
    }

    async fn upload_once(
        &self,
        stored_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<UploadedImage, MediaError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(stored_name.to_string())
            .mime_str(content_type)
            .map_err(|_| MediaError::UnsupportedType {
                content_type: content_type.to_string(),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("fileName", stored_name.to_string())
            .text("folder", self.config.folder.clone())
            .text("useUniqueFileName", "false");

        let response = self
            .http
            .post(&self.config.upload_url)
            .basic_auth(&self.config.private_key, Some(""))
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::from_reqwest(&e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(MediaError::from_status(status.as_u16(), message));
        }

        let body: UploadResponse = response.json().await.map_err(|e| MediaError::InvalidResponse {
            message: e.to_string(),
        })?;
        Ok(UploadedImage {
            url: body.url,
            file_id: body.file_id,
            width: body.width,
            height: body.height,
        })
    }
}

/// File extension from the original name, else from the content type
fn extension_for(file_name: &str, content_type: &str) -> String {
    if let Some((_, ext)) = file_name.rsplit_once('.') {
        if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_lowercase();
        }
    }

    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        _ => "bin",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use axum::{extract::State, http::{HeaderMap, StatusCode}, routing::post, Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(upload_url: String) -> MediaConfig {
        MediaConfig {
            url_endpoint: "https://ik.imagekit.io/demo".into(),
            upload_url,
            private_key: "private_test_key".into(),
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..MediaConfig::default()
        }
    }

    /// Fake CDN answering each request with the next status from `script`
    async fn fake_cdn(script: Vec<u16>) -> (String, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let state = (calls.clone(), Arc::new(script));

        async fn handler(
            State((calls, script)): State<(Arc<AtomicU32>, Arc<Vec<u16>>)>,
            headers: HeaderMap,
        ) -> (StatusCode, Json<serde_json::Value>) {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            if !headers.contains_key("authorization") {
                return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"message": "no auth"})));
            }
            let status = script.get(n).copied().unwrap_or(200);
            let status = StatusCode::from_u16(status).unwrap();
            if status.is_success() {
                (
                    status,
                    Json(serde_json::json!({
                        "fileId": "file_123",
                        "name": "x.png",
                        "url": "https://ik.imagekit.io/demo/blog/x.png",
                        "width": 640,
                        "height": 480
                    })),
                )
            } else {
                (status, Json(serde_json::json!({"message": format!("status {}", status)})))
            }
        }

        let app = Router::new().route("/upload", post(handler)).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/upload", addr), calls)
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0, 0, 0, 0];

    #[tokio::test]
    async fn test_upload_retries_server_errors() {
        let (url, calls) = fake_cdn(vec![503, 502, 200]).await;
        let client = MediaClient::new(config(url)).unwrap();

        let image = client.upload("cover.PNG", PNG.to_vec(), "image/png").await.unwrap();
        assert_eq!(image.file_id, "file_123");
        assert_eq!(image.width, Some(640));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_gives_up_after_retries() {
        let (url, calls) = fake_cdn(vec![500, 500, 500, 500]).await;
        let client = MediaClient::new(config(url)).unwrap();

        let err = client.upload("a.png", PNG.to_vec(), "image/png").await.unwrap_err();
        assert!(matches!(err, MediaError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_upload_does_not_retry_client_errors() {
        let (url, calls) = fake_cdn(vec![403]).await;
        let client = MediaClient::new(config(url)).unwrap();

        let err = client.upload("a.png", PNG.to_vec(), "image/png").await.unwrap_err();
        assert!(matches!(err, MediaError::Auth { status: 403 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (url, calls) = fake_cdn(vec![400]).await;
        let client = MediaClient::new(config(url)).unwrap();
        let err = client.upload("a.png", PNG.to_vec(), "image/png").await.unwrap_err();
        assert!(matches!(err, MediaError::BadRequest { status: 400, ref message } if message == "status 400 Bad Request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_validation_happens_before_network() {
        let client = MediaClient::new(config("http://127.0.0.1:9/unreachable".into())).unwrap();

        let err = client.upload("page.html", b"<html>".to_vec(), "text/html").await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType { .. }));

        let too_big = vec![0u8; (client.config().max_file_size + 1) as usize];
        let err = client.upload("big.png", too_big, "image/png").await.unwrap_err();
        assert!(matches!(err, MediaError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_client_is_a_config_error() {
        let client = MediaClient::new(MediaConfig::default()).unwrap();
        assert!(!client.is_configured());
        let err = client.upload("a.png", PNG.to_vec(), "image/png").await.unwrap_err();
        assert!(matches!(err, MediaError::Config { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("Photo.JPEG", "image/jpeg"), "jpeg");
        assert_eq!(extension_for("no_extension", "image/webp"), "webp");
        assert_eq!(extension_for("weird.name.with spaces", "image/png"), "png");
    }
}
