//! Boundary-level configuration types.
//!
//! Every field is optional so a partial `rendergate.toml` is valid; the
//! render crate resolves these into concrete runtime settings.

use std::path::PathBuf;

use rendergate_types::RenderOptions;
use serde::Deserialize;

/// Serde helper for fields that default to `true`.
#[must_use]
pub const fn default_true() -> bool {
    true
}

/// Root of `rendergate.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RendergateConfig {
    /// Rendering service endpoint and request policy.
    pub service: Option<ServiceConfig>,

    /// Where directive script bundles live.
    pub directives: Option<DirectivesConfig>,

    /// Screenshot handling.
    pub artifacts: Option<ArtifactsConfig>,

    /// Enablement strategies.
    pub enable: Option<EnableConfig>,
}

impl RendergateConfig {
    /// Default rendering service base URL.
    pub const DEFAULT_SERVICE_URL: &'static str = "http://127.0.0.1:8050";

    /// Default directive directory, relative to the config file.
    pub const DEFAULT_DIRECTIVES_DIR: &'static str = "directives";

    /// Default primary script extension.
    pub const DEFAULT_PRIMARY_EXT: &'static str = "lua";

    /// Default companion script extension.
    pub const DEFAULT_COMPANION_EXT: &'static str = "js";

    /// Grace period added on top of a declared render timeout.
    pub const DEFAULT_TIMEOUT_MARGIN_SECONDS: u32 = 30;

    /// The crawl engine's download timeout for requests that carry none.
    pub const DEFAULT_DOWNLOAD_TIMEOUT_SECONDS: u32 = 180;

    /// Render timeout an enabler asks for when none is configured.
    pub const DEFAULT_ENABLER_TIMEOUT_SECONDS: u32 = 60;

    /// Score at or above which the score strategy triggers.
    pub const DEFAULT_MIN_SCORE: f64 = 1.0;

    #[must_use]
    pub fn service_url(&self) -> &str {
        self.service
            .as_ref()
            .and_then(|s| s.url.as_deref())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(Self::DEFAULT_SERVICE_URL)
    }

    #[must_use]
    pub fn timeout_margin_seconds(&self) -> u32 {
        self.service
            .as_ref()
            .and_then(|s| s.timeout_margin_seconds)
            .unwrap_or(Self::DEFAULT_TIMEOUT_MARGIN_SECONDS)
    }

    #[must_use]
    pub fn download_timeout_seconds(&self) -> u32 {
        self.service
            .as_ref()
            .and_then(|s| s.download_timeout_seconds)
            .unwrap_or(Self::DEFAULT_DOWNLOAD_TIMEOUT_SECONDS)
    }

    #[must_use]
    pub fn respect_slots(&self) -> bool {
        self.service
            .as_ref()
            .and_then(|s| s.respect_slots)
            .unwrap_or(true)
    }
}

/// `[service]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the rendering service.
    pub url: Option<String>,

    /// Reuse the original page's download slot for the rendering call.
    /// Default: true.
    pub respect_slots: Option<bool>,

    /// Seconds added to a declared render timeout. Default: 30.
    pub timeout_margin_seconds: Option<u32>,

    /// The engine's download timeout, used as the budget of a rendering
    /// call whose request carries none. Default: 180.
    pub download_timeout_seconds: Option<u32>,

    /// Default render options applied to every rendering call.
    pub defaults: Option<RenderOptions>,
}

/// `[directives]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectivesConfig {
    pub dir: Option<PathBuf>,
    pub primary_ext: Option<String>,
    pub companion_ext: Option<String>,
}

/// How screenshots are handed to downstream consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactMode {
    /// Decoded bytes attached to the response metadata.
    #[default]
    Inline,
    /// Persisted to the artifact store; the reference is attached instead.
    Stored,
}

/// `[artifacts]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default)]
    pub mode: ArtifactMode,

    /// Root directory for stored screenshots.
    pub dir: Option<PathBuf>,

    /// Public URL prefix under which `dir` is served. When unset, stored
    /// artifacts are referenced with `file://` URLs.
    pub public_base_url: Option<String>,
}

/// `[enable]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnableConfig {
    /// Ask for rendered HTML when a strategy triggers. Default: true.
    pub html: Option<bool>,

    /// Ask for a screenshot when a strategy triggers. Default: true.
    pub png: Option<bool>,

    /// Options attached to a triggered render request.
    /// Default: `{ debug = true, timeout = 60 }`.
    pub options: Option<RenderOptions>,

    /// Regex over the request URL, checked before dispatch.
    pub url: Option<RuleSetConfig>,

    /// Regex over the raw response body.
    pub body: Option<RuleSetConfig>,

    /// Minimum page score.
    pub score: Option<ScoreConfig>,

    /// CSS selectors over the parsed response body.
    pub markup: Option<RuleSetConfig>,
}

/// Ordered rule list for one strategy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSetConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A single rule: a pattern and an optional directive.
///
/// ```toml
/// rules = [
///     "^https://app\\.",
///     ["og:video", "video"],
///     { pattern = "player", directive = "video" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RuleConfig {
    Pattern(String),
    Pair(String, String),
    Table {
        pattern: String,
        #[serde(default)]
        directive: Option<String>,
    },
}

impl RuleConfig {
    #[must_use]
    pub fn pattern(&self) -> &str {
        match self {
            RuleConfig::Pattern(pattern)
            | RuleConfig::Pair(pattern, _)
            | RuleConfig::Table { pattern, .. } => pattern,
        }
    }

    #[must_use]
    pub fn directive(&self) -> Option<&str> {
        match self {
            RuleConfig::Pattern(_) => None,
            RuleConfig::Pair(_, directive) => Some(directive),
            RuleConfig::Table { directive, .. } => directive.as_deref(),
        }
    }
}

/// `[enable.score]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoreConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default: 1.0.
    pub min_score: Option<f64>,
}
