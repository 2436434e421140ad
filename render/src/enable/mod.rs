//! Enablement strategies: decide whether a fetch should go through the
//! rendering service.
//!
//! | Strategy | Runs | Looks at |
//! |----------|------|----------|
//! | [`UrlPatternEnabler`] | before dispatch | request URL (regex) |
//! | [`BodyPatternEnabler`] | after a plain fetch | raw body bytes (regex) |
//! | [`ScoreEnabler`] | after a plain fetch | `score` metadata |
//! | [`MarkupEnabler`] | after a plain fetch | parsed HTML (CSS selectors) |
//!
//! Rules within a strategy are ordered and the first match wins. A matching
//! rule attaches a [`RenderRequest`] (with the rule's directive) to the
//! request; the builder picks it up on the next pass.

mod body;
mod markup;
mod score;
mod url_pattern;

use rendergate_config::{EnableConfig, RendergateConfig, RuleConfig};
use rendergate_types::{CrawlRequest, CrawlResponse, DirectiveName, RenderOptions, RenderRequest};

use crate::error::{RenderError, invalid_config};

pub use body::BodyPatternEnabler;
pub use markup::MarkupEnabler;
pub use score::ScoreEnabler;
pub use url_pattern::UrlPatternEnabler;

/// Outcome of a matching rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub directive: Option<DirectiveName>,
}

/// One (pattern, directive) pair.
#[derive(Debug, Clone)]
pub struct Rule<P> {
    pub pattern: P,
    pub directive: Option<DirectiveName>,
}

impl<P> Rule<P> {
    /// Compile a configured rule with a strategy-specific pattern parser.
    pub(crate) fn compile<E: std::fmt::Display>(
        strategy: &str,
        rule: &RuleConfig,
        parse: impl FnOnce(&str) -> Result<P, E>,
    ) -> Result<Self, RenderError> {
        let pattern = parse(rule.pattern()).map_err(|e| {
            invalid_config(format!(
                "invalid {strategy} rule pattern {:?}: {e}",
                rule.pattern()
            ))
            .with_detail("strategy", strategy)
        })?;
        let directive = rule
            .directive()
            .map(DirectiveName::new)
            .transpose()
            .map_err(|e| {
                invalid_config(format!("invalid {strategy} rule directive: {e}"))
                    .with_detail("strategy", strategy)
            })?;
        Ok(Self { pattern, directive })
    }
}

/// First rule whose pattern satisfies `matches`.
pub(crate) fn first_match<P>(
    rules: &[Rule<P>],
    mut matches: impl FnMut(&P) -> bool,
) -> Option<Trigger> {
    rules.iter().find(|rule| matches(&rule.pattern)).map(|rule| Trigger {
        directive: rule.directive.clone(),
    })
}

/// A single enablement strategy.
///
/// Implementations only decide; [`EnablerChain`] applies the recursion guard
/// and attaches the render request.
pub trait RenderEnabler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checked before the request is dispatched.
    fn before_fetch(&self, _request: &CrawlRequest) -> Option<Trigger> {
        None
    }

    /// Checked against the plain (non-rendered) response to `request`.
    fn after_fetch(&self, _request: &CrawlRequest, _response: &CrawlResponse) -> Option<Trigger> {
        None
    }
}

/// The configured strategies in their fixed pipeline order.
pub struct EnablerChain {
    enablers: Vec<Box<dyn RenderEnabler>>,
    template: RenderRequest,
}

impl std::fmt::Debug for EnablerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnablerChain")
            .field(
                "enablers",
                &self.enablers.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("template", &self.template)
            .finish()
    }
}

impl EnablerChain {
    pub fn new(enablers: Vec<Box<dyn RenderEnabler>>, template: RenderRequest) -> Self {
        Self { enablers, template }
    }

    pub fn from_config(config: &RendergateConfig) -> Result<Self, RenderError> {
        let Some(enable) = config.enable.as_ref() else {
            return Ok(Self::new(Vec::new(), default_template(None)));
        };

        let mut enablers: Vec<Box<dyn RenderEnabler>> = Vec::new();
        if let Some(rules) = enable.url.as_ref().filter(|r| r.enabled) {
            enablers.push(Box::new(UrlPatternEnabler::from_rules(&rules.rules)?));
        }
        if let Some(rules) = enable.body.as_ref().filter(|r| r.enabled) {
            enablers.push(Box::new(BodyPatternEnabler::from_rules(&rules.rules)?));
        }
        if let Some(score) = enable.score.as_ref().filter(|s| s.enabled) {
            let min_score = score
                .min_score
                .unwrap_or(RendergateConfig::DEFAULT_MIN_SCORE);
            enablers.push(Box::new(ScoreEnabler::new(min_score)?));
        }
        if let Some(rules) = enable.markup.as_ref().filter(|r| r.enabled) {
            enablers.push(Box::new(MarkupEnabler::from_rules(&rules.rules)?));
        }

        Ok(Self::new(enablers, default_template(Some(enable))))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enablers.is_empty()
    }

    /// The render request a trigger attaches, before its directive is set.
    #[must_use]
    pub fn template(&self) -> &RenderRequest {
        &self.template
    }

    /// Run pre-dispatch strategies. A match attaches a render request in
    /// place; the dont-filter flag is left alone since nothing was fetched yet.
    #[must_use]
    pub fn before_fetch(&self, mut request: CrawlRequest) -> CrawlRequest {
        if request.meta.is_rendering() || request.meta.render.is_some() {
            return request;
        }
        for enabler in &self.enablers {
            if let Some(trigger) = enabler.before_fetch(&request) {
                self.log_trigger(enabler.as_ref(), &request, &trigger);
                request.meta.render = Some(self.render_request(trigger));
                break;
            }
        }
        request
    }

    /// Run post-fetch strategies against a plain response.
    ///
    /// Returns the request to resubmit, forced past the duplicate filter so
    /// the engine does not drop it as a repeat of the fetch that just
    /// completed. Requests that already asked for rendering are skipped: a
    /// render attempt that degraded to a plain fetch must not loop.
    #[must_use]
    pub fn after_fetch(
        &self,
        request: &CrawlRequest,
        response: &CrawlResponse,
    ) -> Option<CrawlRequest> {
        if request.meta.is_rendering() || request.meta.render.is_some() {
            return None;
        }
        self.enablers.iter().find_map(|enabler| {
            let trigger = enabler.after_fetch(request, response)?;
            self.log_trigger(enabler.as_ref(), request, &trigger);
            let mut resubmit = request.clone();
            resubmit.meta.render = Some(self.render_request(trigger));
            resubmit.dont_filter = true;
            Some(resubmit)
        })
    }

    fn render_request(&self, trigger: Trigger) -> RenderRequest {
        self.template.clone().with_directive(trigger.directive)
    }

    fn log_trigger(&self, enabler: &dyn RenderEnabler, request: &CrawlRequest, trigger: &Trigger) {
        tracing::debug!(
            strategy = enabler.name(),
            url = %request.url,
            directive = trigger.directive.as_ref().map(DirectiveName::as_str),
            "Rendering enabled"
        );
    }
}

fn default_template(enable: Option<&EnableConfig>) -> RenderRequest {
    let options = enable
        .and_then(|e| e.options.clone())
        .unwrap_or_else(|| {
            RenderOptions::new().with("debug", true).with(
                "timeout",
                RendergateConfig::DEFAULT_ENABLER_TIMEOUT_SECONDS,
            )
        });
    RenderRequest {
        options,
        html: enable.and_then(|e| e.html).unwrap_or(true),
        png: enable.and_then(|e| e.png).unwrap_or(true),
        directive: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergate_types::{RenderMarker, Url};

    struct Always(&'static str, Option<&'static str>);

    impl RenderEnabler for Always {
        fn name(&self) -> &'static str {
            self.0
        }

        fn before_fetch(&self, _request: &CrawlRequest) -> Option<Trigger> {
            Some(self.trigger())
        }

        fn after_fetch(&self, _: &CrawlRequest, _: &CrawlResponse) -> Option<Trigger> {
            Some(self.trigger())
        }
    }

    impl Always {
        fn trigger(&self) -> Trigger {
            Trigger {
                directive: self.1.map(|d| DirectiveName::new(d).unwrap()),
            }
        }
    }

    fn chain(enablers: Vec<Box<dyn RenderEnabler>>) -> EnablerChain {
        EnablerChain::new(enablers, default_template(None))
    }

    fn request() -> CrawlRequest {
        CrawlRequest::get(Url::parse("http://example.com/page").unwrap())
    }

    fn response() -> CrawlResponse {
        CrawlResponse::new(Url::parse("http://example.com/page").unwrap(), 200, "<html/>")
    }

    #[test]
    fn default_template_matches_enabler_defaults() {
        let template = default_template(None);
        assert!(template.html);
        assert!(template.png);
        assert!(template.options.is_truthy("debug"));
        assert_eq!(template.options.timeout_seconds(), Some(60.0));
    }

    #[test]
    fn before_fetch_attaches_without_touching_dont_filter() {
        let chain = chain(vec![Box::new(Always("a", Some("video")))]);

        let out = chain.before_fetch(request());

        let render = out.meta.render.expect("render request attached");
        assert_eq!(render.directive.unwrap().as_str(), "video");
        assert!(!out.dont_filter);
    }

    #[test]
    fn after_fetch_forces_dont_filter() {
        let chain = chain(vec![Box::new(Always("a", None))]);

        let out = chain.after_fetch(&request(), &response()).unwrap();

        assert!(out.dont_filter);
        assert_eq!(out.meta.render.unwrap().directive, None);
    }

    #[test]
    fn first_strategy_wins() {
        let chain = chain(vec![
            Box::new(Always("first", Some("one"))),
            Box::new(Always("second", Some("two"))),
        ]);

        let out = chain.after_fetch(&request(), &response()).unwrap();

        assert_eq!(out.meta.render.unwrap().directive.unwrap().as_str(), "one");
    }

    #[test]
    fn marked_requests_are_left_alone() {
        let chain = chain(vec![Box::new(Always("a", None))]);
        let mut marked = request();
        marked.meta.marker = Some(RenderMarker::default());

        assert_eq!(chain.before_fetch(marked.clone()), marked);
        assert!(chain.after_fetch(&marked, &response()).is_none());
    }

    #[test]
    fn already_requested_renders_do_not_loop() {
        let chain = chain(vec![Box::new(Always("a", Some("other")))]);
        let mut pending = request();
        pending.meta.render = Some(RenderRequest::default());

        assert_eq!(chain.before_fetch(pending.clone()), pending);
        assert!(chain.after_fetch(&pending, &response()).is_none());
    }

    #[test]
    fn first_match_is_ordered() {
        let rules = vec![
            Rule { pattern: 1, directive: Some(DirectiveName::new("d1").unwrap()) },
            Rule { pattern: 2, directive: Some(DirectiveName::new("d2").unwrap()) },
        ];
        let trigger = first_match(&rules, |_| true).unwrap();
        assert_eq!(trigger.directive.unwrap().as_str(), "d1");
        assert!(first_match(&rules, |p| *p > 5).is_none());
    }

    #[test]
    fn from_config_builds_enabled_strategies_in_order() {
        let config = RendergateConfig::from_toml_str(
            r#"
[enable.markup]
rules = ["video"]
[enable.score]
min_score = 0.5
[enable.url]
enabled = false
rules = ["x"]
[enable.body]
rules = ["y"]
"#,
        )
        .unwrap();

        let chain = EnablerChain::from_config(&config).unwrap();

        let names: Vec<_> = chain.enablers.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["body", "score", "markup"]);
    }

    #[test]
    fn bad_directive_names_are_config_errors() {
        let config = RendergateConfig::from_toml_str(
            r#"
[enable.url]
rules = [["x", "../escape"]]
"#,
        )
        .unwrap();

        let err = EnablerChain::from_config(&config).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
    }
}
