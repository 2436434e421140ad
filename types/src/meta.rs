//! Metadata threaded from a request to its response.
//!
//! The keys the render layer reads or writes are typed fields on
//! [`RequestMeta`]; anything else the crawl pipeline wants to carry lives in
//! the open `extra` map.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::directive::DirectiveName;
use crate::options::RenderOptions;

/// Download-slot identifier used by the crawl engine for per-destination
/// concurrency and delay limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotKey(String);

impl SlotKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending request to route this fetch through the rendering service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Request-scoped options; these override every default.
    #[serde(default)]
    pub options: RenderOptions,

    /// Ask for rendered HTML in the reply.
    #[serde(default)]
    pub html: bool,

    /// Ask for a PNG screenshot in the reply.
    #[serde(default)]
    pub png: bool,

    /// Run a named script bundle instead of the generic render endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<DirectiveName>,
}

impl RenderRequest {
    #[must_use]
    pub fn with_directive(mut self, directive: Option<DirectiveName>) -> Self {
        self.directive = directive;
        self
    }
}

/// Set on a request once it has been rewritten into a rendering-service call.
///
/// Its presence is the recursion guard for the enablers and the builder, and
/// tells the reconstitutor the reply needs unwrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderMarker {
    /// Whether the outbound call asked for a screenshot.
    pub screenshot: bool,
}

/// Screenshot produced by the rendering service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Screenshot {
    /// Decoded PNG bytes.
    Inline { bytes: Vec<u8> },
    /// Reference returned by the artifact store.
    Stored { url: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Render options requested by an enabler or the spider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<RenderMarker>,

    /// URL of the page a rendering call stands for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<Url>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<SlotKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_timeout: Option<Duration>,

    /// Page score attached by an upstream scorer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Referer chain attached by an upstream annotator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referers: Vec<Url>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Screenshot>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl RequestMeta {
    /// True once the request has been rewritten for rendering.
    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.marker.is_some()
    }

    /// Remove and return the saved target URL.
    pub fn take_target_url(&mut self) -> Option<Url> {
        self.target_url.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meta_serializes_to_empty_object() {
        let json = serde_json::to_value(RequestMeta::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn target_url_is_taken_once() {
        let mut meta = RequestMeta {
            target_url: Some(Url::parse("http://example.com/a").unwrap()),
            ..Default::default()
        };
        assert!(meta.take_target_url().is_some());
        assert!(meta.take_target_url().is_none());
    }

    #[test]
    fn screenshot_is_tagged() {
        let json = serde_json::to_value(Screenshot::Stored {
            url: "file:///tmp/x.png".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "stored");
    }
}
