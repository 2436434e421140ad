//! Resolved, invariant-safe configuration.
//!
//! Converts optional, boundary-level configuration into concrete values the
//! pipeline can use without re-checking: a parsed service URL that endpoints
//! resolve beneath, non-empty script extensions and a concrete artifact
//! policy.
use std::path::PathBuf;
use std::time::Duration;

use rendergate_config::{ArtifactMode, RendergateConfig};
use rendergate_types::RenderOptions;
use url::Url;

use crate::error::{RenderError, invalid_config};

#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub service_url: Url,
    pub defaults: RenderOptions,
    pub respect_slots: bool,
    pub timeout_margin: Duration,
    pub download_timeout: Duration,
    pub directives: ResolvedDirectives,
    pub artifacts: ArtifactPolicy,
}

impl ResolvedConfig {
    pub fn from_config(config: &RendergateConfig) -> Result<Self, RenderError> {
        let service_url = parse_service_url(config.service_url())?;
        let defaults = config
            .service
            .as_ref()
            .and_then(|s| s.defaults.clone())
            .unwrap_or_default();
        let timeout_margin = Duration::from_secs(u64::from(config.timeout_margin_seconds()));
        let download_timeout = Duration::from_secs(u64::from(config.download_timeout_seconds()));

        Ok(Self {
            service_url,
            defaults,
            respect_slots: config.respect_slots(),
            timeout_margin,
            download_timeout,
            directives: ResolvedDirectives::from_config(config)?,
            artifacts: ArtifactPolicy::from_config(config)?,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedDirectives {
    pub dir: PathBuf,
    pub primary_ext: String,
    pub companion_ext: String,
}

impl ResolvedDirectives {
    fn from_config(config: &RendergateConfig) -> Result<Self, RenderError> {
        let directives = config.directives.as_ref();
        let dir = directives
            .and_then(|d| d.dir.clone())
            .unwrap_or_else(|| PathBuf::from(RendergateConfig::DEFAULT_DIRECTIVES_DIR));
        let primary_ext = extension(
            directives.and_then(|d| d.primary_ext.as_deref()),
            RendergateConfig::DEFAULT_PRIMARY_EXT,
        )?;
        let companion_ext = extension(
            directives.and_then(|d| d.companion_ext.as_deref()),
            RendergateConfig::DEFAULT_COMPANION_EXT,
        )?;
        if primary_ext == companion_ext {
            return Err(invalid_config(format!(
                "directive script extensions must differ, both are {primary_ext:?}"
            )));
        }

        Ok(Self {
            dir,
            primary_ext,
            companion_ext,
        })
    }
}

/// `".lua"` and `"lua"` are the same extension.
fn extension(configured: Option<&str>, default: &str) -> Result<String, RenderError> {
    let Some(raw) = configured else {
        return Ok(default.to_string());
    };
    let ext = raw.trim().trim_start_matches('.');
    if ext.is_empty() || ext.contains(['/', '\\']) {
        return Err(invalid_config(format!(
            "invalid directive script extension {raw:?}"
        )));
    }
    Ok(ext.to_string())
}

#[derive(Debug, Clone)]
pub(crate) enum ArtifactPolicy {
    Inline,
    Stored {
        dir: PathBuf,
        public_base_url: Option<Url>,
    },
}

impl ArtifactPolicy {
    fn from_config(config: &RendergateConfig) -> Result<Self, RenderError> {
        let Some(artifacts) = config.artifacts.as_ref() else {
            return Ok(Self::Inline);
        };
        match artifacts.mode {
            ArtifactMode::Inline => Ok(Self::Inline),
            ArtifactMode::Stored => {
                let dir = artifacts.dir.clone().ok_or_else(|| {
                    invalid_config("artifacts.mode = \"stored\" requires artifacts.dir")
                })?;
                let public_base_url = artifacts
                    .public_base_url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .map(|u| {
                        Url::parse(u.trim()).map_err(|e| {
                            invalid_config(format!("invalid artifacts.public_base_url {u:?}: {e}"))
                        })
                    })
                    .transpose()?;
                Ok(Self::Stored {
                    dir,
                    public_base_url,
                })
            }
        }
    }
}

fn parse_service_url(raw: &str) -> Result<Url, RenderError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| invalid_config(format!("invalid service.url {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid_config(format!(
            "service.url must be http or https, got {:?}",
            url.scheme()
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid_config(format!(
            "service.url must not carry a query or fragment: {raw:?}"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
