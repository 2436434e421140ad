//! Unwraps rendering-service replies back into page responses.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rendergate_types::{CrawlRequest, CrawlResponse, Headers};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::artifacts::ScreenshotPolicy;
use crate::error::{ErrorCode, RenderError};
use crate::stats::RenderStats;

/// Metadata key under which unrecognized reply fields are kept.
pub const REPLY_EXTRA_KEY: &str = "render_reply";

/// A successful rendering-service reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RenderReply {
    /// Rendered HTML; an absent field is an empty page.
    #[serde(default)]
    pub html: Option<String>,

    /// Base64-encoded PNG screenshot.
    #[serde(default)]
    pub png: Option<String>,

    /// Everything else the service returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RenderReply {
    pub fn parse(body: &[u8]) -> Result<Self, RenderError> {
        serde_json::from_slice(body).map_err(|e| {
            RenderError::new(
                ErrorCode::RenderPayloadInvalid,
                format!("rendering service reply is not a render payload: {e}"),
            )
        })
    }

    pub fn screenshot_bytes(&self) -> Result<Option<Vec<u8>>, RenderError> {
        self.png
            .as_deref()
            .map(|png| {
                STANDARD.decode(png.trim()).map_err(|e| {
                    RenderError::new(
                        ErrorCode::RenderPayloadInvalid,
                        format!("screenshot is not valid base64: {e}"),
                    )
                })
            })
            .transpose()
    }
}

#[derive(Debug)]
pub struct Reconstitutor {
    stats: Arc<RenderStats>,
    screenshots: ScreenshotPolicy,
}

impl Reconstitutor {
    pub fn new(stats: Arc<RenderStats>, screenshots: ScreenshotPolicy) -> Self {
        Self { stats, screenshots }
    }

    /// Turn the reply to a rewritten request back into a page response.
    ///
    /// Responses to unmarked requests are not ours and pass through. Every
    /// failure is logged and the raw reply passes through; the saved target
    /// URL is consumed only when unwrapping succeeds.
    pub fn reconstitute(
        &self,
        request: &mut CrawlRequest,
        response: CrawlResponse,
    ) -> CrawlResponse {
        let Some(marker) = request.meta.marker else {
            return response;
        };
        self.stats.record_response(response.status);

        match self.unwrap(request, &response, marker.screenshot) {
            Ok(page) => page,
            Err(err) => {
                err.log(request.meta.target_url.as_ref().unwrap_or(&response.url));
                response
            }
        }
    }

    fn unwrap(
        &self,
        request: &mut CrawlRequest,
        response: &CrawlResponse,
        screenshot_requested: bool,
    ) -> Result<CrawlResponse, RenderError> {
        if response.status != 200 {
            return Err(RenderError::new(
                ErrorCode::RenderServiceError,
                format!("rendering service answered {}", response.status),
            )
            .with_detail("status", response.status.to_string()));
        }

        let reply = RenderReply::parse(&response.body)?;
        let screenshot = if screenshot_requested {
            reply.screenshot_bytes()?
        } else {
            None
        };
        let target = request.meta.take_target_url().ok_or_else(|| {
            RenderError::new(
                ErrorCode::MissingTargetUrl,
                "rendered response has no saved target URL",
            )
        })?;

        let mut meta = request.meta.clone();
        if let Some(bytes) = screenshot {
            match self.screenshots.attach(bytes) {
                Ok(artifact) => meta.screenshot = Some(artifact),
                Err(err) => err.log(&target),
            }
        }
        if !reply.extra.is_empty() {
            meta.extra
                .insert(REPLY_EXTRA_KEY.into(), Value::Object(reply.extra));
        }

        let mut headers = Headers::new();
        headers.set("Content-Type", "text/html; charset=utf-8");
        tracing::debug!(url = %target, "Reconstituted rendered response");

        Ok(CrawlResponse {
            url: target,
            status: 200,
            headers,
            body: reply.html.unwrap_or_default().into_bytes(),
            encoding: Some("utf-8".into()),
            meta,
        })
    }
}
