//! HTTP client for the inference service.
//!
//! `InferenceApi` is the seam the dashboard talks to; `HttpApi` implements
//! it over `ureq` against `{api_base}`:
//!
//! - `GET  /health`
//! - `POST /detect/video/analyze`   (multipart: file, confidence, feed_id)
//! - `POST /detect/image/annotated` (multipart: file, confidence)
//! - `POST /stream/config`          (JSON)

mod multipart;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::AlertConfig;
use crate::config::DetectionConfig;
use crate::detect::VideoAnalysis;
use crate::feed::FeedId;

pub use multipart::MultipartForm;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;
const PEOPLE_COUNT_HEADER: &str = "X-People-Count";

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct HealthStatus {
    #[serde(default = "unknown_detector")]
    pub detector_type: String,
}

fn unknown_detector() -> String {
    "unknown".to_string()
}

/// One batch analysis request.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoUpload {
    pub feed_id: FeedId,
    pub path: PathBuf,
    pub mime: String,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnotatedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// From the `X-People-Count` response header.
    pub people_count: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamConfigRequest {
    pub confidence: f32,
    pub realtime_mode: bool,
    pub alert_config: AlertConfig,
}

impl From<&DetectionConfig> for StreamConfigRequest {
    fn from(cfg: &DetectionConfig) -> Self {
        Self {
            confidence: cfg.confidence,
            realtime_mode: cfg.realtime_mode,
            alert_config: AlertConfig::from(cfg),
        }
    }
}

/// Requests the dashboard makes against the inference service.
pub trait InferenceApi: Send + Sync {
    fn health(&self) -> Result<HealthStatus>;

    fn analyze_video(&self, upload: &VideoUpload) -> Result<VideoAnalysis>;

    fn annotate_image(&self, path: &Path, confidence: f32) -> Result<AnnotatedImage>;

    fn push_stream_config(&self, cfg: &DetectionConfig) -> Result<()>;
}

pub struct HttpApi {
    base: String,
    agent: ureq::Agent,
    upload_agent: ureq::Agent,
}

impl HttpApi {
    pub fn new(api_base: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build();
        let upload_agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(UPLOAD_TIMEOUT)
            .build();
        Self {
            base: api_base.trim_end_matches('/').to_string(),
            agent,
            upload_agent,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

impl InferenceApi for HttpApi {
    fn health(&self) -> Result<HealthStatus> {
        let url = self.url("health");
        let response = self.agent.get(&url).call().map_err(describe_error)?;
        response
            .into_json::<HealthStatus>()
            .with_context(|| format!("decode health response from {}", url))
    }

    fn analyze_video(&self, upload: &VideoUpload) -> Result<VideoAnalysis> {
        let bytes = std::fs::read(&upload.path)
            .with_context(|| format!("read video {}", upload.path.display()))?;
        let (content_type, body) = MultipartForm::new()
            .file("file", &file_name(&upload.path), &upload.mime, &bytes)
            .text("confidence", &upload.confidence.to_string())
            .text("feed_id", upload.feed_id.as_str())
            .finish();
        let url = self.url("detect/video/analyze");
        log::info!(
            "HttpApi: uploading {} ({} bytes) for {}",
            upload.path.display(),
            bytes.len(),
            upload.feed_id
        );
        let response = self
            .upload_agent
            .post(&url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .map_err(describe_error)?;
        response
            .into_json::<VideoAnalysis>()
            .with_context(|| format!("decode analysis response from {}", url))
    }

    fn annotate_image(&self, path: &Path, confidence: f32) -> Result<AnnotatedImage> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read image {}", path.display()))?;
        let mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let (content_type, body) = MultipartForm::new()
            .file("file", &file_name(path), &mime, &bytes)
            .text("confidence", &confidence.to_string())
            .finish();
        let response = self
            .upload_agent
            .post(&self.url("detect/image/annotated"))
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .map_err(describe_error)?;

        let people_count = match response.header(PEOPLE_COUNT_HEADER) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .map_err(|_| anyhow!("invalid {} header '{}'", PEOPLE_COUNT_HEADER, raw))?,
            ),
            None => None,
        };
        let content_type = response.header("Content-Type").map(str::to_string);
        let mut image = Vec::new();
        response
            .into_reader()
            .take(MAX_IMAGE_BYTES)
            .read_to_end(&mut image)
            .context("read annotated image")?;
        if image.is_empty() {
            return Err(anyhow!("empty annotated image"));
        }
        Ok(AnnotatedImage {
            bytes: image,
            content_type,
            people_count,
        })
    }

    fn push_stream_config(&self, cfg: &DetectionConfig) -> Result<()> {
        let request = StreamConfigRequest::from(cfg);
        self.agent
            .post(&self.url("stream/config"))
            .send_json(&request)
            .map_err(describe_error)?;
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string())
}

/// Turn a ureq error into a message carrying the status and the server's
/// `detail` field when present.
fn describe_error(err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, response) => {
            let url = response.get_url().to_string();
            let detail = response
                .into_string()
                .ok()
                .and_then(|body| {
                    serde_json::from_str::<serde_json::Value>(&body)
                        .ok()
                        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                        .or(Some(body))
                })
                .filter(|detail| !detail.trim().is_empty());
            match detail {
                Some(detail) => anyhow!("HTTP {} from {}: {}", code, url, detail.trim()),
                None => anyhow!("HTTP {} from {}", code, url),
            }
        }
        ureq::Error::Transport(transport) => anyhow!("request failed: {}", transport),
    }
}
