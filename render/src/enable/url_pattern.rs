use regex::Regex;
use rendergate_config::RuleConfig;
use rendergate_types::CrawlRequest;

use super::{RenderEnabler, Rule, Trigger, first_match};
use crate::error::RenderError;

/// Regex rules over the request URL, checked before dispatch.
#[derive(Debug, Clone)]
pub struct UrlPatternEnabler {
    rules: Vec<Rule<Regex>>,
}

impl UrlPatternEnabler {
    pub fn new(rules: Vec<Rule<Regex>>) -> Self {
        Self { rules }
    }

    pub fn from_rules(rules: &[RuleConfig]) -> Result<Self, RenderError> {
        rules
            .iter()
            .map(|rule| Rule::compile("url", rule, Regex::new))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl RenderEnabler for UrlPatternEnabler {
    fn name(&self) -> &'static str {
        "url"
    }

    fn before_fetch(&self, request: &CrawlRequest) -> Option<Trigger> {
        first_match(&self.rules, |re| re.is_match(request.url.as_str()))
    }
}
