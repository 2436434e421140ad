use regex::bytes::Regex;
use rendergate_config::RuleConfig;
use rendergate_types::{CrawlRequest, CrawlResponse};

use super::{RenderEnabler, Rule, Trigger, first_match};
use crate::error::RenderError;

/// Regex rules over the raw bytes of a plain response body.
#[derive(Debug, Clone)]
pub struct BodyPatternEnabler {
    rules: Vec<Rule<Regex>>,
}

impl BodyPatternEnabler {
    pub fn new(rules: Vec<Rule<Regex>>) -> Self {
        Self { rules }
    }

    pub fn from_rules(rules: &[RuleConfig]) -> Result<Self, RenderError> {
        rules
            .iter()
            .map(|rule| Rule::compile("body", rule, Regex::new))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl RenderEnabler for BodyPatternEnabler {
    fn name(&self) -> &'static str {
        "body"
    }

    fn after_fetch(&self, _request: &CrawlRequest, response: &CrawlResponse) -> Option<Trigger> {
        first_match(&self.rules, |re| re.is_match(&response.body))
    }
}
