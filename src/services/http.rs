use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tiny_skia::Pixmap;
use tracing::debug;

use super::{
    DetectedText, Detector, Inpainter, ServiceFuture, TextTranslator, TranslateRequest,
};
use crate::error::PipelineError;
use crate::geometry::Point;
use crate::raster;
use crate::region::Confidence;
use crate::settings::Settings;

/// JSON-over-HTTP backend exposing `/detect`, `/translate` and `/inpaint`.
/// Images travel as base64 PNG.
#[derive(Debug, Clone)]
pub struct HttpServices {
    client: reqwest::Client,
    base_url: String,
    translate_timeout: Duration,
    inpaint_timeout: Duration,
}

impl HttpServices {
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = Settings::default();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            translate_timeout: defaults.translate_timeout,
            inpaint_timeout: defaults.inpaint_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            translate_timeout: settings.translate_timeout,
            inpaint_timeout: settings.inpaint_timeout,
            ..Self::new(settings.api_url.clone())
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    regions: Vec<DetectedRegionBody>,
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Deserialize)]
struct DetectedRegionBody {
    text: String,
    polygon: Vec<[f32; 2]>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Deserialize)]
struct InpaintResponse {
    image: String,
}

impl Detector for HttpServices {
    fn detect(&self, image: Pixmap) -> ServiceFuture<Vec<DetectedText>> {
        let client = self.client.clone();
        let url = self.endpoint("detect");
        let timeout = self.translate_timeout;
        Box::pin(async move {
            let body = json!({ "image": encode_image("detect", &image)? });
            let text = post_json("detect", &client, &url, &body, timeout).await?;
            let parsed: DetectResponse = serde_json::from_str(&text)
                .map_err(|err| PipelineError::service("detect", err))?;
            if parsed.blocked {
                return Err(PipelineError::Blocked {
                    service: "detect".to_string(),
                });
            }
            debug!("detect returned {} regions", parsed.regions.len());
            Ok(parsed
                .regions
                .into_iter()
                .map(|region| DetectedText {
                    text: region.text,
                    polygon: region
                        .polygon
                        .into_iter()
                        .map(|[x, y]| Point::new(x, y))
                        .collect(),
                    confidence: region
                        .confidence
                        .map(Confidence::from_score)
                        .unwrap_or_default(),
                })
                .collect())
        })
    }
}

impl TextTranslator for HttpServices {
    fn translate(&self, request: TranslateRequest) -> ServiceFuture<String> {
        let client = self.client.clone();
        let url = self.endpoint("translate");
        let timeout = self.translate_timeout;
        Box::pin(async move {
            let body = json!({
                "text": request.text,
                "target_language": request.target_language,
                "source_language": request.source_language,
            });
            let text = post_json("translate", &client, &url, &body, timeout).await?;
            let parsed: TranslateResponse = serde_json::from_str(&text)
                .map_err(|err| PipelineError::service("translate", err))?;
            if parsed.blocked {
                return Err(PipelineError::Blocked {
                    service: "translate".to_string(),
                });
            }
            parsed
                .text
                .ok_or_else(|| PipelineError::service("translate", "response has no text"))
        })
    }
}

impl Inpainter for HttpServices {
    fn inpaint(&self, image: Pixmap, mask: Pixmap) -> ServiceFuture<Pixmap> {
        let client = self.client.clone();
        let url = self.endpoint("inpaint");
        let timeout = self.inpaint_timeout;
        Box::pin(async move {
            let body = json!({
                "image": encode_image("inpaint", &image)?,
                "mask": encode_image("inpaint", &mask)?,
            });
            let text = post_json("inpaint", &client, &url, &body, timeout).await?;
            let parsed: InpaintResponse = serde_json::from_str(&text)
                .map_err(|err| PipelineError::service("inpaint", err))?;
            let bytes = BASE64
                .decode(parsed.image.trim())
                .map_err(|err| PipelineError::service("inpaint", err))?;
            raster::decode_image(&bytes)
                .map_err(|err| PipelineError::service("inpaint", format!("{err:#}")))
        })
    }
}

fn encode_image(service: &str, image: &Pixmap) -> Result<String, PipelineError> {
    let bytes = raster::encode_png(image)
        .map_err(|err| PipelineError::service(service, format!("{err:#}")))?;
    Ok(BASE64.encode(bytes))
}

async fn post_json(
    service: &str,
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    timeout: Duration,
) -> Result<String, PipelineError> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|err| request_error(service, err, timeout))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| request_error(service, err, timeout))?;
    if !status.is_success() {
        return Err(PipelineError::service(
            service,
            format!("HTTP {}: {}", status, text.trim()),
        ));
    }
    Ok(text)
}

fn request_error(service: &str, err: reqwest::Error, timeout: Duration) -> PipelineError {
    if err.is_timeout() {
        PipelineError::timeout(service, timeout)
    } else {
        PipelineError::service(service, err)
    }
}
