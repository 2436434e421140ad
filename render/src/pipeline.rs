//! The render layer as the crawl engine sees it: one hook before dispatch,
//! one after a response arrives.

use std::sync::Arc;

use rendergate_config::RendergateConfig;
use rendergate_types::{CrawlRequest, CrawlResponse};

use crate::artifacts::{ArtifactStore, FsArtifactStore, ScreenshotPolicy};
use crate::builder::RequestBuilder;
use crate::coordinator::{Coordinator, HostSlots, SlotAssigner};
use crate::directive::DirectiveStore;
use crate::enable::EnablerChain;
use crate::error::RenderError;
use crate::reconstitute::Reconstitutor;
use crate::resolved::{ArtifactPolicy, ResolvedConfig};
use crate::stats::RenderStats;

/// What the engine should do with a response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// Hand this response to downstream consumers.
    Response(CrawlResponse),
    /// Drop the plain response and schedule this request instead.
    Resubmit(CrawlRequest),
}

#[derive(Debug)]
pub struct RenderPipeline {
    enablers: EnablerChain,
    builder: RequestBuilder,
    reconstitutor: Reconstitutor,
    directives: Arc<DirectiveStore>,
    stats: Arc<RenderStats>,
}

impl RenderPipeline {
    /// Build a pipeline with the engine's slot function.
    ///
    /// `artifacts` overrides the configured artifact store; with `None`, a
    /// `stored` artifact mode writes to the configured directory.
    pub fn new(
        config: &RendergateConfig,
        slots: Arc<dyn SlotAssigner>,
        artifacts: Option<Arc<dyn ArtifactStore>>,
    ) -> Result<Self, RenderError> {
        let resolved = ResolvedConfig::from_config(config)?;
        let enablers = EnablerChain::from_config(config)?;

        let stats = Arc::new(RenderStats::new());
        let directives = Arc::new(DirectiveStore::new(
            resolved.directives.dir,
            resolved.directives.primary_ext,
            resolved.directives.companion_ext,
        ));
        let coordinator = Coordinator::new(
            slots,
            resolved.respect_slots,
            resolved.timeout_margin,
            resolved.download_timeout,
        );
        let screenshots = match (artifacts, resolved.artifacts) {
            (Some(store), _) => ScreenshotPolicy::Stored(store),
            (None, ArtifactPolicy::Inline) => ScreenshotPolicy::Inline,
            (
                None,
                ArtifactPolicy::Stored {
                    dir,
                    public_base_url,
                },
            ) => ScreenshotPolicy::Stored(Arc::new(FsArtifactStore::new(dir, public_base_url))),
        };

        tracing::debug!(
            service = %resolved.service_url,
            directives = %directives.dir().display(),
            enablers = ?enablers,
            screenshots = ?screenshots,
            "Render pipeline ready"
        );

        Ok(Self {
            enablers,
            builder: RequestBuilder::new(
                resolved.service_url,
                resolved.defaults,
                Arc::clone(&directives),
                coordinator,
                Arc::clone(&stats),
            ),
            reconstitutor: Reconstitutor::new(Arc::clone(&stats), screenshots),
            directives,
            stats,
        })
    }

    /// Pipeline slotting rendering calls by host.
    pub fn from_config(config: &RendergateConfig) -> Result<Self, RenderError> {
        Self::new(config, Arc::new(HostSlots), None)
    }

    /// Pre-dispatch hook: URL rules, then rewriting.
    #[must_use]
    pub fn process_request(&self, request: CrawlRequest) -> CrawlRequest {
        let request = self.enablers.before_fetch(request);
        self.builder.process_request(request)
    }

    /// Post-response hook.
    ///
    /// Replies to rewritten requests are reconstituted. Plain responses run
    /// through the response rules; a match asks for the request to be
    /// resubmitted for rendering.
    pub fn process_response(
        &self,
        request: &mut CrawlRequest,
        response: CrawlResponse,
    ) -> ResponseOutcome {
        if request.meta.is_rendering() {
            return ResponseOutcome::Response(self.reconstitutor.reconstitute(request, response));
        }
        match self.enablers.after_fetch(request, &response) {
            Some(resubmit) => ResponseOutcome::Resubmit(resubmit),
            None => ResponseOutcome::Response(response),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    #[must_use]
    pub fn directives(&self) -> &Arc<DirectiveStore> {
        &self.directives
    }

    #[must_use]
    pub fn enablers(&self) -> &EnablerChain {
        &self.enablers
    }

    #[must_use]
    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }
}

#[cfg(test)]
mod tests {
    use rendergate_types::{RenderRequest, SlotKey, Url};

    use super::*;

    fn pipeline(toml: &str) -> RenderPipeline {
        RenderPipeline::from_config(&RendergateConfig::from_toml_str(toml).unwrap()).unwrap()
    }

    #[test]
    fn url_rules_rewrite_before_dispatch() {
        let pipeline = pipeline("[enable.url]\nrules = [\"/app/\"]\n");
        let request = CrawlRequest::get(Url::parse("http://example.com/app/home").unwrap());

        let out = pipeline.process_request(request);

        assert!(out.meta.is_rendering());
        assert_eq!(out.url.as_str(), "http://127.0.0.1:8050/render.json");
        assert!(!out.dont_filter);
        assert_eq!(pipeline.stats().requests_issued(), 1);
    }

    #[test]
    fn plain_responses_without_rules_pass_through() {
        let pipeline = pipeline("");
        let mut request = CrawlRequest::get(Url::parse("http://example.com/").unwrap());
        let response = CrawlResponse::new(request.url.clone(), 200, "<html/>");

        assert_eq!(
            pipeline.process_response(&mut request, response.clone()),
            ResponseOutcome::Response(response)
        );
    }

    #[test]
    fn custom_slot_assigner_is_used() {
        let pipeline = RenderPipeline::new(
            &RendergateConfig::default(),
            Arc::new(|_: &CrawlRequest| SlotKey::new("engine-slot")),
            None,
        )
        .unwrap();
        let mut request = CrawlRequest::get(Url::parse("http://example.com/").unwrap());
        request.meta.render = Some(RenderRequest::default());

        let out = pipeline.process_request(request);

        assert_eq!(out.meta.slot_key, Some(SlotKey::new("engine-slot")));
    }

    #[test]
    fn invalid_rules_fail_construction() {
        let config = RendergateConfig::from_toml_str("[enable.body]\nrules = [\"(\"]\n").unwrap();
        assert!(RenderPipeline::from_config(&config).is_err());
    }
}
