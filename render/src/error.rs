//! Structured errors for the render layer.
//!
//! Every runtime error here is contained: callers log it and fall back to
//! treating the fetch as a normal, non-rendered one. Only
//! [`ErrorCode::InvalidConfig`] surfaces to the embedding application, at
//! startup.

use serde::{Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Render-layer error with a stable code and key/value details.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RenderError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable description.
    pub message: String,

    /// Error-specific context.
    pub details: ErrorDetails,
}

impl RenderError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: ErrorDetails::default(),
        }
    }

    /// Add a detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.0.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "code": self.code,
            "message": self.message,
        });

        if !self.details.0.is_empty() {
            let details: serde_json::Map<String, serde_json::Value> = self
                .details
                .0
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            obj["details"] = serde_json::Value::Object(details);
        }

        obj
    }

    /// Log at the level this error's code calls for.
    pub(crate) fn log(&self, url: &Url) {
        match self.code {
            ErrorCode::UnsupportedMethod => tracing::warn!(
                url = %url,
                method = self.detail("method").unwrap_or_default(),
                "{}; handling without rendering",
                self.message
            ),
            ErrorCode::RenderServiceError => tracing::warn!(
                url = %url,
                status = self.detail("status").unwrap_or_default(),
                "{}",
                self.message
            ),
            _ => tracing::error!(
                url = %url,
                code = self.code.as_str(),
                details = ?self.details.0,
                "{}",
                self.message
            ),
        }
    }
}

impl Serialize for RenderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Only GET requests can be rendered.
    UnsupportedMethod,
    /// No script files exist for the requested directive.
    DirectiveNotFound,
    /// Directive files exist but could not be read.
    DirectiveUnreadable,
    /// The rendering service answered with a non-200 status.
    RenderServiceError,
    /// A 200 reply that is not a usable render payload.
    RenderPayloadInvalid,
    /// A marked response whose request lost its saved target URL.
    MissingTargetUrl,
    /// Screenshot could not be persisted.
    ArtifactStoreFailed,
    /// Configuration could not be resolved.
    InvalidConfig,
    /// Unexpected internal error.
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedMethod => "unsupported_method",
            ErrorCode::DirectiveNotFound => "directive_not_found",
            ErrorCode::DirectiveUnreadable => "directive_unreadable",
            ErrorCode::RenderServiceError => "render_service_error",
            ErrorCode::RenderPayloadInvalid => "render_payload_invalid",
            ErrorCode::MissingTargetUrl => "missing_target_url",
            ErrorCode::ArtifactStoreFailed => "artifact_store_failed",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Error details as key-value pairs.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetails(pub Vec<(String, String)>);

pub(crate) fn invalid_config(message: impl Into<String>) -> RenderError {
    RenderError::new(ErrorCode::InvalidConfig, message)
}
