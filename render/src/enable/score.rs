use rendergate_types::{CrawlRequest, CrawlResponse};

use super::{RenderEnabler, Trigger};
use crate::error::{RenderError, invalid_config};

/// Render pages whose upstream score reaches a threshold.
///
/// The score is read from request metadata; a missing score counts as 0.
#[derive(Debug, Clone, Copy)]
pub struct ScoreEnabler {
    min_score: f64,
}

impl ScoreEnabler {
    pub fn new(min_score: f64) -> Result<Self, RenderError> {
        if min_score.is_nan() {
            return Err(invalid_config("score threshold must be a number")
                .with_detail("strategy", "score"));
        }
        Ok(Self { min_score })
    }

    #[must_use]
    pub fn min_score(&self) -> f64 {
        self.min_score
    }
}

impl RenderEnabler for ScoreEnabler {
    fn name(&self) -> &'static str {
        "score"
    }

    fn after_fetch(&self, request: &CrawlRequest, _response: &CrawlResponse) -> Option<Trigger> {
        let score = request.meta.score.unwrap_or(0.0);
        (score >= self.min_score).then(Trigger::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergate_types::Url;

    fn scored(score: Option<f64>) -> (CrawlRequest, CrawlResponse) {
        let url = Url::parse("http://example.com/page").unwrap();
        let mut request = CrawlRequest::get(url.clone());
        request.meta.score = score;
        (request, CrawlResponse::new(url, 200, ""))
    }

    #[test]
    fn below_threshold_does_not_trigger() {
        let (request, response) = scored(Some(0.99));
        let enabler = ScoreEnabler::new(1.0).unwrap();
        assert!(enabler.after_fetch(&request, &response).is_none());
    }

    #[test]
    fn at_or_above_threshold_triggers_without_directive() {
        let enabler = ScoreEnabler::new(0.9).unwrap();
        for score in [0.9, 0.99] {
            let (request, response) = scored(Some(score));
            assert_eq!(
                enabler.after_fetch(&request, &response),
                Some(Trigger::default())
            );
        }
    }

    #[test]
    fn missing_and_nan_scores_do_not_trigger_positive_thresholds() {
        let enabler = ScoreEnabler::new(0.5).unwrap();
        let (request, response) = scored(None);
        assert!(enabler.after_fetch(&request, &response).is_none());
        let (request, response) = scored(Some(f64::NAN));
        assert!(enabler.after_fetch(&request, &response).is_none());
    }

    #[test]
    fn nan_threshold_is_rejected() {
        assert!(ScoreEnabler::new(f64::NAN).is_err());
    }
}
