//! Rewrites a page fetch into a rendering-service call.
//!
//! Two endpoints:
//!
//! - `render.json`: the generic renderer. The full option set, the target
//!   `url` and the original request headers travel in the JSON body.
//! - `execute`: runs a [`Directive`](crate::Directive). The target `url` and
//!   the options go in the query string; the body carries the scripts.
//!
//! The rewritten request carries everything the reconstitutor needs in its
//! own metadata (marker and saved target URL), so nothing is shared between
//! in-flight requests.

use std::sync::Arc;

use rendergate_types::{
    CrawlRequest, DirectiveName, Headers, Method, RenderMarker, RenderOptions, RenderRequest,
    RequestMeta, Url,
};
use serde_json::{Map, Value};

use crate::coordinator::Coordinator;
use crate::directive::DirectiveStore;
use crate::error::{ErrorCode, RenderError};
use crate::stats::RenderStats;

const RENDER_ENDPOINT: &str = "render.json";
const EXECUTE_ENDPOINT: &str = "execute";

/// Field name of the target URL, both in the query and in the JSON body.
pub const TARGET_URL_FIELD: &str = "url";

#[derive(Debug)]
pub struct RequestBuilder {
    service_url: Url,
    defaults: RenderOptions,
    directives: Arc<DirectiveStore>,
    coordinator: Coordinator,
    stats: Arc<RenderStats>,
}

impl RequestBuilder {
    /// `service_url` must end with `/` so endpoints resolve beneath it.
    pub fn new(
        service_url: Url,
        defaults: RenderOptions,
        directives: Arc<DirectiveStore>,
        coordinator: Coordinator,
        stats: Arc<RenderStats>,
    ) -> Self {
        Self {
            service_url,
            defaults,
            directives,
            coordinator,
            stats,
        }
    }

    #[must_use]
    pub fn service_url(&self) -> &Url {
        &self.service_url
    }

    /// Rewrite `request` if it asks for rendering.
    ///
    /// Marked requests and requests without a pending render request pass
    /// through. A failed rewrite is logged and the original request is
    /// returned unmodified, so the page is fetched as if rendering had never
    /// been asked for.
    #[must_use]
    pub fn process_request(&self, request: CrawlRequest) -> CrawlRequest {
        if request.meta.is_rendering() {
            return request;
        }
        let Some(render) = request.meta.render.as_ref() else {
            return request;
        };

        match self.build(&request, render) {
            Ok(rewritten) => rewritten,
            Err(err) => {
                err.log(&request.url);
                request
            }
        }
    }

    /// Build the rendering-service call standing in for `request`.
    ///
    /// Nothing is counted or recorded unless the rewrite succeeds.
    pub fn build(
        &self,
        request: &CrawlRequest,
        render: &RenderRequest,
    ) -> Result<CrawlRequest, RenderError> {
        if request.method != Method::Get {
            return Err(RenderError::new(
                ErrorCode::UnsupportedMethod,
                format!("only GET requests can be rendered, got {}", request.method),
            )
            .with_detail("method", request.method.as_str()));
        }

        let options = self.resolve_options(render);
        let (url, body) = match &render.directive {
            Some(name) => {
                let directive = self.directives.load(name)?;
                (
                    self.execute_url(&request.url, &options)?,
                    directive.script_body(),
                )
            }
            None => (
                self.endpoint(RENDER_ENDPOINT)?,
                render_body(request, &options),
            ),
        };
        let body = serde_json::to_vec(&body).map_err(|e| {
            RenderError::new(
                ErrorCode::Internal,
                format!("failed to encode render body: {e}"),
            )
        })?;

        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");

        let meta = self.prepare_meta(request, &options);
        self.stats.record_request();
        tracing::debug!(
            url = %request.url,
            endpoint = %url,
            directive = render.directive.as_ref().map(DirectiveName::as_str),
            "Rewrote request for rendering"
        );

        Ok(CrawlRequest {
            url,
            method: Method::Post,
            headers,
            body,
            meta,
            dont_filter: request.dont_filter,
        })
    }

    /// `defaults`, then the flags' implied options, then the request's own.
    #[must_use]
    pub fn resolve_options(&self, render: &RenderRequest) -> RenderOptions {
        let mut options = self.defaults.clone();
        if render.html {
            options.insert("html", 1);
        }
        if render.png {
            options.insert("png", 1);
        }
        options.extend_from(&render.options);
        options
    }

    fn prepare_meta(&self, original: &CrawlRequest, options: &RenderOptions) -> RequestMeta {
        let mut meta = original.meta.clone();
        meta.render = None;
        if let Some(declared) = options.timeout_seconds() {
            meta.download_timeout = Some(
                self.coordinator
                    .extended_timeout(meta.download_timeout, declared),
            );
        }
        if let Some(slot) = self.coordinator.slot_key_for(original) {
            meta.slot_key = Some(slot);
        }
        meta.target_url = Some(original.url.clone());
        meta.marker = Some(RenderMarker {
            screenshot: options.is_truthy("png"),
        });
        meta
    }

    fn endpoint(&self, name: &str) -> Result<Url, RenderError> {
        self.service_url.join(name).map_err(|e| {
            RenderError::new(
                ErrorCode::Internal,
                format!("invalid rendering endpoint {name}: {e}"),
            )
        })
    }

    fn execute_url(&self, target: &Url, options: &RenderOptions) -> Result<Url, RenderError> {
        let mut url = self.endpoint(EXECUTE_ENDPOINT)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in options.iter().filter(|(k, _)| *k != TARGET_URL_FIELD) {
                query.append_pair(key, &RenderOptions::query_value(value));
            }
            query.append_pair(TARGET_URL_FIELD, target.as_str());
        }
        Ok(url)
    }
}

fn render_body(request: &CrawlRequest, options: &RenderOptions) -> Value {
    let mut body: Map<String, Value> = options
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    body.insert(
        TARGET_URL_FIELD.into(),
        Value::String(request.url.to_string()),
    );
    if options.get("headers").is_none() && !request.headers.is_empty() {
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| Value::Array(vec![name.into(), value.into()]))
            .collect();
        body.insert("headers".into(), Value::Array(headers));
    }
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use rendergate_types::SlotKey;
    use tempfile::TempDir;

    use super::*;
    use crate::coordinator::HostSlots;

    fn builder(dir: &TempDir, defaults: RenderOptions) -> RequestBuilder {
        RequestBuilder::new(
            Url::parse("http://splash:8050/").unwrap(),
            defaults,
            Arc::new(DirectiveStore::new(dir.path(), "lua", "js")),
            Coordinator::new(
                Arc::new(HostSlots),
                true,
                Duration::from_secs(30),
                Duration::from_secs(180),
            ),
            Arc::new(RenderStats::new()),
        )
    }

    fn page() -> CrawlRequest {
        CrawlRequest::get(Url::parse("http://example.com/page").unwrap())
    }

    fn render(options: RenderOptions) -> RenderRequest {
        RenderRequest {
            options,
            ..RenderRequest::default()
        }
    }

    fn json_body(request: &CrawlRequest) -> Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[test]
    fn render_json_request_carries_options_url_and_headers() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new().with("wait", 0.5));
        let mut original = page();
        original.headers.set("Accept-Language", "en");

        let out = builder
            .build(&original, &render(RenderOptions::new().with("timeout", 20)))
            .unwrap();

        assert_eq!(out.url.as_str(), "http://splash:8050/render.json");
        assert_eq!(out.method, Method::Post);
        assert_eq!(out.headers.get("content-type"), Some("application/json"));
        let body = json_body(&out);
        assert_eq!(body["url"], "http://example.com/page");
        assert_eq!(body["wait"], 0.5);
        assert_eq!(body["timeout"], 20);
        assert_eq!(body["headers"][0][0], "Accept-Language");
    }

    #[test]
    fn custom_options_override_flags_and_defaults() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new().with("png", 0).with("wait", 1));
        let request = RenderRequest {
            options: RenderOptions::new().with("html", 0),
            html: true,
            png: true,
            directive: None,
        };

        let options = builder.resolve_options(&request);

        assert_eq!(options.get("html"), Some(&Value::from(0)));
        assert_eq!(options.get("png"), Some(&Value::from(1)));
        assert_eq!(options.get("wait"), Some(&Value::from(1)));
    }

    #[test]
    fn metadata_is_threaded_for_the_reconstitutor() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new());
        let mut original = page();
        original.meta.render = Some(RenderRequest {
            png: true,
            ..render(RenderOptions::new().with("timeout", 60))
        });
        original.meta.download_timeout = Some(Duration::from_secs(180));
        original.meta.score = Some(0.7);
        original.dont_filter = true;

        let out = builder.process_request(original);

        assert!(out.dont_filter);
        assert_eq!(out.meta.render, None);
        assert_eq!(out.meta.marker, Some(RenderMarker { screenshot: true }));
        assert_eq!(
            out.meta.target_url.as_ref().map(Url::as_str),
            Some("http://example.com/page")
        );
        assert_eq!(out.meta.slot_key, Some(SlotKey::new("example.com")));
        assert_eq!(out.meta.download_timeout, Some(Duration::from_secs(180)));
        assert_eq!(out.meta.score, Some(0.7));
        assert_eq!(builder.stats.requests_issued(), 1);
    }

    #[test]
    fn declared_timeout_never_shrinks_engine_budget() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new().with("timeout", 60));

        let out = builder.build(&page(), &RenderRequest::default()).unwrap();

        assert_eq!(out.meta.download_timeout, Some(Duration::from_secs(180)));
    }

    #[test]
    fn declared_timeout_extends_budget() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new().with("timeout", 300));

        let out = builder.build(&page(), &RenderRequest::default()).unwrap();

        assert_eq!(out.meta.download_timeout, Some(Duration::from_secs(330)));
    }

    #[test]
    fn custom_headers_option_wins_over_request_headers() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new());
        let mut original = page();
        original.headers.set("Accept-Language", "en");
        let options = RenderOptions::new().with("headers", serde_json::json!({"X-Custom": "1"}));

        let out = builder.build(&original, &render(options)).unwrap();

        let body = json_body(&out);
        assert_eq!(body["headers"], serde_json::json!({"X-Custom": "1"}));
        assert_eq!(body["url"], "http://example.com/page");
    }

    #[test]
    fn directive_uses_execute_endpoint() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("video.lua"), "function main(splash) end").unwrap();
        fs::write(dir.path().join("video.js"), "play()").unwrap();
        let builder = builder(&dir, RenderOptions::new().with("wait", 2));
        let request = RenderRequest {
            png: true,
            ..RenderRequest::default()
        }
        .with_directive(Some(DirectiveName::new("video").unwrap()));

        let out = builder.build(&page(), &request).unwrap();

        assert_eq!(out.url.path(), "/execute");
        let query: Vec<(String, String)> = out.url.query_pairs().into_owned().collect();
        assert!(query.contains(&("url".into(), "http://example.com/page".into())));
        assert!(query.contains(&("png".into(), "1".into())));
        assert!(query.contains(&("wait".into(), "2".into())));
        let body = json_body(&out);
        assert_eq!(body["lua_source"], "function main(splash) end");
        assert_eq!(body["js_source"], "play()");
    }

    #[test]
    fn non_get_requests_pass_through() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new());
        let mut original = page().with_method(Method::Post);
        original.meta.render = Some(RenderRequest::default());

        let err = builder
            .build(&original, &RenderRequest::default())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedMethod);
        assert_eq!(err.detail("method"), Some("POST"));

        assert_eq!(builder.process_request(original.clone()), original);
        assert_eq!(builder.stats.requests_issued(), 0);
    }

    #[test]
    fn missing_directive_passes_request_through() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new());
        let mut original = page();
        original.meta.render = Some(
            RenderRequest::default().with_directive(Some(DirectiveName::new("missing").unwrap())),
        );

        let out = builder.process_request(original.clone());

        assert_eq!(out, original);
        assert_eq!(builder.stats.requests_issued(), 0);
    }

    #[test]
    fn marked_and_unrequested_requests_are_untouched() {
        let dir = TempDir::new().unwrap();
        let builder = builder(&dir, RenderOptions::new());

        let plain = page();
        assert_eq!(builder.process_request(plain.clone()), plain);

        let mut marked = page();
        marked.meta.marker = Some(RenderMarker::default());
        marked.meta.render = Some(RenderRequest::default());
        assert_eq!(builder.process_request(marked.clone()), marked);
    }

    #[test]
    fn slot_affinity_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let builder = RequestBuilder::new(
            Url::parse("http://splash:8050/").unwrap(),
            RenderOptions::new(),
            Arc::new(DirectiveStore::new(dir.path(), "lua", "js")),
            Coordinator::new(
                Arc::new(HostSlots),
                false,
                Duration::from_secs(30),
                Duration::from_secs(180),
            ),
            Arc::new(RenderStats::new()),
        );

        let out = builder.build(&page(), &RenderRequest::default()).unwrap();

        assert_eq!(out.meta.slot_key, None);
    }
}
