//! OCR via the Vision `images:annotate` endpoint.
//!
//! The normalized image is sent inline as base64 with a single
//! `DOCUMENT_TEXT_DETECTION` feature. That feature is tuned for dense
//! printed text (receipts, letters, forms) rather than sparse scene text.

use super::{http_client, with_auth, TextDetector};
use crate::error::OcrError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::debug;

/// Connection settings for [`VisionClient`].
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// API root. Default: `https://vision.googleapis.com`.
    pub endpoint: String,
    /// OAuth2 bearer token.
    pub access_token: Option<String>,
    /// API key, sent as `?key=` when set.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds. Default: 60.
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com".to_string(),
            access_token: None,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// [`TextDetector`] backed by the Vision REST API.
#[derive(Debug, Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, OcrError> {
        let http = http_client(config.timeout_secs)
            .map_err(|e| OcrError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn annotate_url(&self) -> String {
        let base = format!(
            "{}/v1/images:annotate",
            self.config.endpoint.trim_end_matches('/')
        );
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => format!("{base}?key={}", urlencoding::encode(key)),
            _ => base,
        }
    }
}

fn annotate_request(image: &[u8]) -> serde_json::Value {
    json!({
        "requests": [{
            "image": { "content": STANDARD.encode(image) },
            "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
        }]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Pull the recognised text out of an `images:annotate` response body.
fn parse_annotate_response(body: &[u8]) -> Result<Option<String>, OcrError> {
    let parsed: AnnotateResponse =
        serde_json::from_slice(body).map_err(|e| OcrError::InvalidResponse(e.to_string()))?;

    let Some(first) = parsed.responses.into_iter().next() else {
        return Err(OcrError::InvalidResponse("empty 'responses' array".into()));
    };
    if let Some(status) = first.error {
        if status.code != 0 {
            return Err(OcrError::Api {
                code: status.code,
                message: status.message,
            });
        }
    }
    Ok(first
        .full_text_annotation
        .map(|a| a.text)
        .filter(|t| !t.is_empty()))
}

#[async_trait]
impl TextDetector for VisionClient {
    async fn detect_document_text(&self, image_path: &Path) -> Result<Option<String>, OcrError> {
        let image = tokio::fs::read(image_path)
            .await
            .map_err(|e| OcrError::ReadImage {
                path: image_path.to_path_buf(),
                source: e,
            })?;

        let request = self
            .http
            .post(self.annotate_url())
            .json(&annotate_request(&image));
        let response = with_auth(request, self.config.access_token.as_deref())
            .send()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(OcrError::Auth(String::from_utf8_lossy(&body).into_owned()));
            }
            s if !s.is_success() => {
                return Err(OcrError::Api {
                    code: i64::from(s.as_u16()),
                    message: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            _ => {}
        }

        let text = parse_annotate_response(&body)?;
        debug!(
            "OCR returned {} chars for {}",
            text.as_ref().map_or(0, |t| t.chars().count()),
            image_path.display()
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_asks_for_document_text() {
        let req = annotate_request(b"abc");
        assert_eq!(req["requests"][0]["image"]["content"], "YWJj");
        assert_eq!(
            req["requests"][0]["features"][0]["type"],
            "DOCUMENT_TEXT_DETECTION"
        );
    }

    #[test]
    fn parses_full_text() {
        let body = br#"{"responses":[{"fullTextAnnotation":{"text":"Invoice #42\n","pages":[]}}]}"#;
        assert_eq!(
            parse_annotate_response(body).unwrap().as_deref(),
            Some("Invoice #42\n")
        );
    }

    #[test]
    fn no_text_is_none() {
        assert_eq!(parse_annotate_response(br#"{"responses":[{}]}"#).unwrap(), None);
    }

    #[test]
    fn per_image_error_is_api_error() {
        let body = br#"{"responses":[{"error":{"code":8,"message":"quota exceeded"}}]}"#;
        match parse_annotate_response(body) {
            Err(OcrError::Api { code, message }) => {
                assert_eq!(code, 8);
                assert!(message.contains("quota"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn api_key_is_appended() {
        let client = VisionClient::new(VisionConfig {
            api_key: Some("k1".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.annotate_url(),
            "https://vision.googleapis.com/v1/images:annotate?key=k1"
        );
    }
}
