//! Directive script bundles loaded from disk and cached for the process lifetime.
//!
//! A directive `D` is the pair `<dir>/D.<primary_ext>` and
//! `<dir>/D.<companion_ext>`. Either file may be absent; both absent is
//! [`ErrorCode::DirectiveNotFound`]. The directive set is small and fixed by
//! deployment, so nothing is ever evicted.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use rendergate_types::DirectiveName;
use serde_json::{Map, Value};

use crate::error::{ErrorCode, RenderError};

/// Body field carrying the primary script on the execute endpoint.
pub const PRIMARY_SOURCE_FIELD: &str = "lua_source";

/// Body field carrying the companion script on the execute endpoint.
pub const COMPANION_SOURCE_FIELD: &str = "js_source";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: DirectiveName,
    primary: Option<String>,
    companion: Option<String>,
}

impl Directive {
    #[must_use]
    pub fn name(&self) -> &DirectiveName {
        &self.name
    }

    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    #[must_use]
    pub fn companion(&self) -> Option<&str> {
        self.companion.as_deref()
    }

    /// JSON body for the script-execution endpoint. Absent scripts are omitted.
    #[must_use]
    pub fn script_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(primary) = &self.primary {
            body.insert(PRIMARY_SOURCE_FIELD.into(), Value::String(primary.clone()));
        }
        if let Some(companion) = &self.companion {
            body.insert(COMPANION_SOURCE_FIELD.into(), Value::String(companion.clone()));
        }
        Value::Object(body)
    }
}

#[derive(Debug)]
pub struct DirectiveStore {
    dir: PathBuf,
    primary_ext: String,
    companion_ext: String,
    cache: RwLock<HashMap<DirectiveName, Arc<Directive>>>,
}

impl DirectiveStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        primary_ext: impl Into<String>,
        companion_ext: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            primary_ext: primary_ext.into(),
            companion_ext: companion_ext.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a directive, reading from disk on first use.
    ///
    /// Concurrent first loads of the same name may both read the files; the
    /// first insert wins and every caller gets that entry.
    pub fn load(&self, name: &DirectiveName) -> Result<Arc<Directive>, RenderError> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            tracing::trace!(directive = %name, "Directive cache hit");
            return Ok(Arc::clone(hit));
        }

        let loaded = Arc::new(self.read_from_disk(name)?);
        tracing::debug!(
            directive = %name,
            primary = loaded.primary.is_some(),
            companion = loaded.companion.is_some(),
            "Loaded directive"
        );

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(name.clone()).or_insert(loaded)))
    }

    /// Number of cached directives.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn script_path(&self, name: &DirectiveName, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{ext}", name.as_str()))
    }

    fn read_from_disk(&self, name: &DirectiveName) -> Result<Directive, RenderError> {
        let primary_path = self.script_path(name, &self.primary_ext);
        let companion_path = self.script_path(name, &self.companion_ext);
        let primary = read_optional(name, &primary_path)?;
        let companion = read_optional(name, &companion_path)?;

        if primary.is_none() && companion.is_none() {
            return Err(RenderError::new(
                ErrorCode::DirectiveNotFound,
                format!("no script files for directive '{name}'"),
            )
            .with_detail("directive", name.as_str())
            .with_detail("dir", self.dir.display().to_string()));
        }

        Ok(Directive {
            name: name.clone(),
            primary,
            companion,
        })
    }
}

fn read_optional(name: &DirectiveName, path: &Path) -> Result<Option<String>, RenderError> {
    match fs::read_to_string(path) {
        Ok(source) => Ok(Some(source)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RenderError::new(
            ErrorCode::DirectiveUnreadable,
            format!("failed to read directive '{name}': {e}"),
        )
        .with_detail("directive", name.as_str())
        .with_detail("path", path.display().to_string())),
    }
}
