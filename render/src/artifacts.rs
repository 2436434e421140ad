//! Screenshot persistence.
//!
//! Screenshots are either attached inline (decoded bytes) or written to an
//! [`ArtifactStore`] under a content-addressed key, with the returned
//! reference attached instead. One mode per deployment; downstream consumers
//! key on one or the other.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rendergate_types::Screenshot;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use url::Url;

use crate::error::{ErrorCode, RenderError};

/// Object storage capability: persist `bytes` under `key`, return a reference URL.
pub trait ArtifactStore: Send + Sync {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<String, RenderError>;
}

/// Content-addressed key for screenshot bytes: `{first2}/{sha256hex}.png`.
#[must_use]
pub fn screenshot_key(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex = hex_encode(&digest);
    format!("{}/{hex}.png", &hex[..2])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Local-directory artifact store.
///
/// Writes are atomic (temp file + rename). Since keys are content-addressed,
/// an existing file already holds the same bytes and is left alone.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    public_base_url: Option<Url>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<Url>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(with_trailing_slash),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reference(&self, key: &str, path: &Path) -> Result<String, RenderError> {
        if let Some(base) = &self.public_base_url {
            return base
                .join(key)
                .map(String::from)
                .map_err(|e| store_error(key, format!("invalid artifact URL: {e}")));
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| store_error(key, e.to_string()))?
                .join(path)
        };
        Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|()| store_error(key, format!("not a file path: {}", absolute.display())))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn store(&self, key: &str, bytes: &[u8]) -> Result<String, RenderError> {
        let path = self.root.join(key);
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| store_error(key, e.to_string()))?;

        if !path.exists() {
            let mut tmp =
                NamedTempFile::new_in(parent).map_err(|e| store_error(key, e.to_string()))?;
            tmp.write_all(bytes)
                .and_then(|()| tmp.as_file().sync_all())
                .map_err(|e| store_error(key, e.to_string()))?;
            if let Err(err) = tmp.persist_noclobber(&path) {
                // Lost a race with an identical write.
                if !path.exists() {
                    return Err(store_error(key, err.error.to_string()));
                }
            }
        }

        self.reference(key, &path)
    }
}

fn store_error(key: &str, message: impl fmt::Display) -> RenderError {
    RenderError::new(
        ErrorCode::ArtifactStoreFailed,
        format!("failed to store artifact {key}: {message}"),
    )
    .with_detail("key", key)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// How a decoded screenshot is attached to the reconstituted response.
#[derive(Clone, Default)]
pub enum ScreenshotPolicy {
    #[default]
    Inline,
    Stored(Arc<dyn ArtifactStore>),
}

impl fmt::Debug for ScreenshotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenshotPolicy::Inline => f.write_str("Inline"),
            ScreenshotPolicy::Stored(_) => f.write_str("Stored(..)"),
        }
    }
}

impl ScreenshotPolicy {
    pub fn attach(&self, bytes: Vec<u8>) -> Result<Screenshot, RenderError> {
        match self {
            ScreenshotPolicy::Inline => Ok(Screenshot::Inline { bytes }),
            ScreenshotPolicy::Stored(store) => {
                let key = screenshot_key(&bytes);
                let url = store.store(&key, &bytes)?;
                tracing::debug!(key = %key, url = %url, "Stored screenshot");
                Ok(Screenshot::Stored { url })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn keys_are_content_addressed() {
        let a = screenshot_key(b"png-bytes");
        assert_eq!(a, screenshot_key(b"png-bytes"));
        assert_ne!(a, screenshot_key(b"other"));
        let (prefix, file) = a.split_once('/').unwrap();
        assert_eq!(prefix.len(), 2);
        assert!(file.starts_with(prefix));
        assert!(file.ends_with(".png"));
        assert_eq!(file.len(), 64 + 4);
    }

    #[test]
    fn stores_with_public_url() {
        let tmp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(
            tmp.path(),
            Some(Url::parse("https://cdn.example.com/shots").unwrap()),
        );
        let key = screenshot_key(b"abc");

        let url = store.store(&key, b"abc").unwrap();

        assert_eq!(url, format!("https://cdn.example.com/shots/{key}"));
        assert_eq!(fs::read(tmp.path().join(&key)).unwrap(), b"abc");
    }

    #[test]
    fn stores_with_file_url_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(tmp.path(), None);
        let key = screenshot_key(b"abc");

        let first = store.store(&key, b"abc").unwrap();
        let second = store.store(&key, b"abc").unwrap();

        assert!(first.starts_with("file://"));
        assert_eq!(first, second);
    }

    #[test]
    fn inline_policy_keeps_bytes() {
        let shot = ScreenshotPolicy::Inline.attach(vec![1, 2, 3]).unwrap();
        assert_eq!(shot, Screenshot::Inline { bytes: vec![1, 2, 3] });
    }

    #[test]
    fn stored_policy_returns_reference() {
        let tmp = TempDir::new().unwrap();
        let policy = ScreenshotPolicy::Stored(Arc::new(FsArtifactStore::new(tmp.path(), None)));

        let shot = policy.attach(b"png".to_vec()).unwrap();

        let Screenshot::Stored { url } = shot else {
            panic!("expected stored screenshot");
        };
        assert!(url.ends_with(&screenshot_key(b"png")));
    }
}
