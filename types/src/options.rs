use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Option set sent to the rendering service (`wait`, `timeout`, `png`, ...).
///
/// Keys are kept in sorted order so the outbound query string and JSON body
/// are deterministic for a given option set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderOptions(BTreeMap<String, Value>);

impl RenderOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay `overrides` on top of `self`. Keys present in `overrides`
    /// always win; everything else keeps its current value.
    pub fn extend_from(&mut self, overrides: &RenderOptions) {
        for (key, value) in &overrides.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Non-mutating form of [`RenderOptions::extend_from`].
    #[must_use]
    pub fn merged(&self, overrides: &RenderOptions) -> RenderOptions {
        let mut out = self.clone();
        out.extend_from(overrides);
        out
    }

    /// Declared render timeout in seconds.
    ///
    /// The key is matched case-insensitively and numeric strings are
    /// accepted, since option sets often come straight from config files.
    #[must_use]
    pub fn timeout_seconds(&self) -> Option<f64> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("timeout"))
            .and_then(|(_, v)| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
    }

    /// Whether `key` is set to a truthy value (`true`, non-zero, `"1"`, `"true"`, `"yes"`).
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => matches!(s.trim(), "1" | "true" | "yes"),
            _ => false,
        }
    }

    /// Render a value the way it should appear in a query string.
    #[must_use]
    pub fn query_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => u8::from(*b).to_string(),
            other => other.to_string(),
        }
    }
}

impl FromIterator<(String, Value)> for RenderOptions {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for RenderOptions {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_prefers_overrides_per_key() {
        let defaults = RenderOptions::new()
            .with("wait", 0.5)
            .with("timeout", 30)
            .with("viewport", "1024x768");
        let custom = RenderOptions::new().with("timeout", 90).with("png", 1);

        let merged = defaults.merged(&custom);

        assert_eq!(merged.get("timeout"), Some(&json!(90)));
        assert_eq!(merged.get("png"), Some(&json!(1)));
        assert_eq!(merged.get("wait"), Some(&json!(0.5)));
        assert_eq!(merged.get("viewport"), Some(&json!("1024x768")));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn merge_law_holds_for_every_key() {
        let defaults: RenderOptions = (0..20)
            .map(|i| (format!("k{i}"), json!(i)))
            .collect();
        let custom: RenderOptions = (10..30)
            .step_by(2)
            .map(|i| (format!("k{i}"), json!(format!("c{i}"))))
            .collect();

        let merged = defaults.merged(&custom);

        for i in 0..30 {
            let key = format!("k{i}");
            let expected = custom.get(&key).or_else(|| defaults.get(&key));
            assert_eq!(merged.get(&key), expected, "key {key}");
        }
    }

    #[test]
    fn timeout_is_case_insensitive_and_parses_strings() {
        assert_eq!(
            RenderOptions::new().with("Timeout", "45").timeout_seconds(),
            Some(45.0)
        );
        assert_eq!(
            RenderOptions::new().with("timeout", 12.5).timeout_seconds(),
            Some(12.5)
        );
        assert_eq!(RenderOptions::new().with("timeout", -1).timeout_seconds(), None);
        assert_eq!(RenderOptions::new().timeout_seconds(), None);
    }

    #[test]
    fn truthiness() {
        let opts = RenderOptions::new()
            .with("a", true)
            .with("b", 1)
            .with("c", 0)
            .with("d", "true")
            .with("e", false)
            .with("f", "yes")
            .with("g", "no");
        assert!(opts.is_truthy("a"));
        assert!(opts.is_truthy("b"));
        assert!(!opts.is_truthy("c"));
        assert!(opts.is_truthy("d"));
        assert!(!opts.is_truthy("e"));
        assert!(opts.is_truthy("f"));
        assert!(!opts.is_truthy("g"));
        assert!(!opts.is_truthy("missing"));
    }

    #[test]
    fn query_values_are_flat() {
        assert_eq!(RenderOptions::query_value(&json!("x y")), "x y");
        assert_eq!(RenderOptions::query_value(&json!(true)), "1");
        assert_eq!(RenderOptions::query_value(&json!(2.5)), "2.5");
    }
}
