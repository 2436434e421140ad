use std::env;

/// Expand `${VAR}` and `${VAR:-fallback}` references.
///
/// Unset variables expand to the fallback, or to nothing. An unterminated
/// `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, |name| env::var(name).ok())
}

pub(crate) fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };
        if !name.is_empty() {
            let resolved = lookup(name)
                .filter(|v| !v.is_empty())
                .or_else(|| fallback.map(str::to_string))
                .unwrap_or_default();
            out.push_str(&resolved);
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOST" => Some("render.internal".into()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[test]
    fn expands_known_variables() {
        assert_eq!(
            expand_with("http://${HOST}:8050", lookup),
            "http://render.internal:8050"
        );
    }

    #[test]
    fn unset_and_empty_use_fallback() {
        assert_eq!(expand_with("${MISSING:-a}/${EMPTY:-b}", lookup), "a/b");
        assert_eq!(expand_with("x${MISSING}y", lookup), "xy");
    }

    #[test]
    fn unterminated_reference_is_literal() {
        assert_eq!(expand_with("a${HOST", lookup), "a${HOST");
    }

    #[test]
    fn multibyte_text_is_preserved() {
        assert_eq!(expand_with("é${HOST}ü", lookup), "érender.internalü");
    }
}
