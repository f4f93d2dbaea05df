use chrono::Utc;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CloudinaryConfig;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage provider rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub bytes: Option<i64>,
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    width: Option<i64>,
    height: Option<i64>,
    bytes: Option<i64>,
    format: Option<String>,
}

impl From<UploadResponse> for UploadedImage {
    fn from(value: UploadResponse) -> Self {
        Self {
            url: value.secure_url,
            public_id: value.public_id,
            width: value.width,
            height: value.height,
            bytes: value.bytes,
            format: value.format,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Image uploads backed by Cloudinary's REST upload API.
#[derive(Debug, Clone)]
pub struct ImageStorage {
    http: Client,
    config: CloudinaryConfig,
}

impl ImageStorage {
    pub fn new(config: CloudinaryConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{action}",
            self.config.cloud_name
        )
    }

    /// Uploads an image. The public id is the content hash, so the same bytes
    /// always land on the same asset.
    pub async fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: String,
        content_type: &str,
    ) -> Result<UploadedImage, StorageError> {
        let public_id = sha256::digest(bytes.as_slice());
        let timestamp = Utc::now().timestamp().to_string();
        let params = [
            ("folder", self.config.folder.as_str()),
            ("overwrite", "true"),
            ("public_id", public_id.as_str()),
            ("timestamp", timestamp.as_str()),
        ];
        let signature = sign(&params, &self.config.api_secret);

        let file = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)?;
        let mut form = Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key.to_string(), value.to_string());
        }

        let response = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let uploaded: UploadedImage = response.json::<UploadResponse>().await?.into();
        info!("uploaded image {}", uploaded.public_id);
        Ok(uploaded)
    }

    /// Deletes an image. Returns `false` when the provider did not know it.
    pub async fn delete(&self, public_id: &str) -> Result<bool, StorageError> {
        let timestamp = Utc::now().timestamp().to_string();
        let params = [("public_id", public_id), ("timestamp", timestamp.as_str())];
        let signature = sign(&params, &self.config.api_secret);

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let destroyed: DestroyResponse = response.json().await?;
        match destroyed.result.as_str() {
            "ok" => {
                info!("deleted image {public_id}");
                Ok(true)
            }
            "not found" => Ok(false),
            other => Err(StorageError::Rejected(other.to_string())),
        }
    }
}

async fn rejection(response: reqwest::Response) -> StorageError {
    let status = response.status();
    match response.json::<ProviderError>().await {
        Ok(body) => StorageError::Rejected(body.error.message),
        Err(_) => StorageError::Rejected(format!("status {status}")),
    }
}

/// Cloudinary request signature: the parameters sorted by name, joined as a
/// query string, with the API secret appended, hashed with SHA-256.
fn sign(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    sha256::digest(format!("{joined}{secret}"))
}

pub fn is_image(content_type: &str) -> bool {
    content_type.starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_sorts_parameters_and_appends_secret() {
        let signature = sign(
            &[
                ("timestamp", "1700000000"),
                ("public_id", "abc123"),
                ("folder", "weatherplaces"),
            ],
            "shh",
        );
        assert_eq!(
            signature,
            "806ce17a1f04c51653b46abdc23bbef2e59037d19bec05d854c9a4d221e3cb61"
        );
    }

    #[test]
    fn content_hash_names_uploads() {
        assert_eq!(
            sha256::digest(b"hello".as_slice()),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn only_images_are_accepted() {
        assert!(is_image("image/png"));
        assert!(is_image("image/webp"));
        assert!(!is_image("application/pdf"));
    }

    #[test]
    fn upload_response_prefers_secure_url() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"public_id": "weatherplaces/abc", "url": "http://res.cloudinary.com/demo/abc.png",
                "secure_url": "https://res.cloudinary.com/demo/abc.png",
                "width": 640, "height": 480, "bytes": 1234, "format": "png"}"#,
        )
        .unwrap();
        let uploaded = UploadedImage::from(response);
        assert_eq!(uploaded.url, "https://res.cloudinary.com/demo/abc.png");
        assert_eq!(uploaded.width, Some(640));
    }
}
