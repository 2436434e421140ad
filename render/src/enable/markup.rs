use rendergate_config::RuleConfig;
use rendergate_types::{CrawlRequest, CrawlResponse};
use scraper::{Html, Selector};

use super::{RenderEnabler, Rule, Trigger, first_match};
use crate::error::RenderError;

/// CSS selector rules over the parsed body of a plain response.
#[derive(Debug, Clone)]
pub struct MarkupEnabler {
    rules: Vec<Rule<Selector>>,
}

impl MarkupEnabler {
    pub fn new(rules: Vec<Rule<Selector>>) -> Self {
        Self { rules }
    }

    pub fn from_rules(rules: &[RuleConfig]) -> Result<Self, RenderError> {
        rules
            .iter()
            .map(|rule| {
                Rule::compile("markup", rule, |css| {
                    Selector::parse(css).map_err(|e| e.to_string())
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl RenderEnabler for MarkupEnabler {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn after_fetch(&self, _request: &CrawlRequest, response: &CrawlResponse) -> Option<Trigger> {
        if self.rules.is_empty() || !is_markup(response) {
            return None;
        }
        let document = Html::parse_document(&response.text_lossy());
        first_match(&self.rules, |selector| {
            document.select(selector).next().is_some()
        })
    }
}

/// Responses without a content type are assumed to be markup.
fn is_markup(response: &CrawlResponse) -> bool {
    response
        .headers
        .get("content-type")
        .is_none_or(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("html") || ct.contains("xml")
        })
}
