use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::geometry::Point;
use crate::region::Confidence;

mod http;

pub use http::HttpServices;

pub type ServiceFuture<T> = Pin<Box<dyn Future<Output = Result<T, PipelineError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedText {
    pub text: String,
    pub polygon: Vec<Point>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
    pub source_language: Option<String>,
}

/// Finds text in an image. An image without text yields an empty list.
pub trait Detector: Send + Sync {
    fn detect(&self, image: Pixmap) -> ServiceFuture<Vec<DetectedText>>;
}

pub trait TextTranslator: Send + Sync {
    fn translate(&self, request: TranslateRequest) -> ServiceFuture<String>;
}

/// Fills the masked part of `image`. The result has the size of the input.
pub trait Inpainter: Send + Sync {
    fn inpaint(&self, image: Pixmap, mask: Pixmap) -> ServiceFuture<Pixmap>;
}

#[derive(Clone)]
pub struct Services {
    pub detector: Arc<dyn Detector>,
    pub translator: Arc<dyn TextTranslator>,
    pub inpainter: Arc<dyn Inpainter>,
}

impl Services {
    pub fn new(
        detector: Arc<dyn Detector>,
        translator: Arc<dyn TextTranslator>,
        inpainter: Arc<dyn Inpainter>,
    ) -> Self {
        Self {
            detector,
            translator,
            inpainter,
        }
    }

    /// One backend serving all three roles.
    pub fn shared<S>(backend: Arc<S>) -> Self
    where
        S: Detector + TextTranslator + Inpainter + 'static,
    {
        Self {
            detector: backend.clone(),
            translator: backend.clone(),
            inpainter: backend,
        }
    }
}

/// Awaits `call` for at most `limit`, mapping expiry to a timeout error.
pub async fn with_timeout<T>(
    service: &str,
    limit: Duration,
    call: ServiceFuture<T>,
) -> Result<T, PipelineError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => {
            debug!("{service} call finished");
            Ok(value)
        }
        Ok(Err(err)) => {
            warn!("{service} call failed: {err}");
            Err(err)
        }
        Err(_) => {
            warn!("{service} call timed out after {:.0}s", limit.as_secs_f32());
            Err(PipelineError::timeout(service, limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalled;

    impl Inpainter for Stalled {
        fn inpaint(&self, _image: Pixmap, _mask: Pixmap) -> ServiceFuture<Pixmap> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(PipelineError::service("inpaint", "unreachable"))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_separately() {
        let image = Pixmap::new(2, 2).expect("pixmap");
        let call = Stalled.inpaint(image.clone(), image);
        let err = with_timeout("inpaint", Duration::from_secs(60), call)
            .await
            .expect_err("timeout");
        assert!(matches!(err, PipelineError::Timeout { .. }));
        assert!(err.is_service_failure());
    }
}
