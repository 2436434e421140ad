//! JSON reports printed by the CLI.

use rendergate_render::StatsSnapshot;
use rendergate_types::{CrawlRequest, CrawlResponse, Headers, RequestMeta, Screenshot};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub(crate) struct PlanStep {
    stage: &'static str,
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<RequestReport>,
}

impl PlanStep {
    /// The request the engine would dispatch at `stage`.
    pub fn dispatch(stage: &'static str, request: &CrawlRequest) -> Self {
        let action = if request.meta.is_rendering() {
            "render"
        } else {
            "fetch"
        };
        Self {
            stage,
            action,
            request: Some(RequestReport::from(request)),
        }
    }

    pub fn deliver(stage: &'static str) -> Self {
        Self {
            stage,
            action: "deliver",
            request: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RequestReport {
    url: String,
    method: String,
    #[serde(skip_serializing_if = "Headers::is_empty")]
    headers: Headers,
    /// JSON bodies are shown parsed; anything else as lossy text.
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
    dont_filter: bool,
    meta: RequestMeta,
}

impl From<&CrawlRequest> for RequestReport {
    fn from(request: &CrawlRequest) -> Self {
        let body = (!request.body.is_empty()).then(|| {
            serde_json::from_slice(&request.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&request.body).into_owned())
            })
        });
        Self {
            url: request.url.to_string(),
            method: request.method.to_string(),
            headers: request.headers.clone(),
            body,
            dont_filter: request.dont_filter,
            meta: request.meta.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PageReport {
    url: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
    body_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot: Option<ScreenshotReport>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
enum ScreenshotReport {
    Inline { bytes: usize },
    Stored { url: String },
}

impl From<&CrawlResponse> for PageReport {
    fn from(page: &CrawlResponse) -> Self {
        let screenshot = page.meta.screenshot.as_ref().map(|shot| match shot {
            Screenshot::Inline { bytes } => ScreenshotReport::Inline { bytes: bytes.len() },
            Screenshot::Stored { url } => ScreenshotReport::Stored { url: url.clone() },
        });
        Self {
            url: page.url.to_string(),
            status: page.status,
            encoding: page.encoding.clone(),
            body_bytes: page.body.len(),
            screenshot,
            extra: page.meta.extra.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RunReport {
    pub page: PageReport,
    pub stats: StatsSnapshot,
}
