//! Attribute expression resolution.
//!
//! Configuration values such as the database name or query text may contain
//! `${attribute}` placeholders that are resolved against the triggering flow
//! unit's attributes before use. A placeholder whose attribute is absent
//! resolves to the empty string; the pipeline can therefore self-trigger with
//! no flow unit by resolving against an empty map.

use std::collections::HashMap;

use crate::error::{ConnectorError, ConnectorResult};

/// Resolves `${attribute}` placeholders in `template` against `attributes`.
///
/// `$$` escapes a literal dollar sign. Unknown attributes resolve to the
/// empty string.
///
/// # Errors
///
/// Returns [`ConnectorError::Expression`] for an unterminated `${`.
pub fn resolve(template: &str, attributes: &HashMap<String, String>) -> ConnectorResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if !closed {
                    return Err(ConnectorError::Expression(format!(
                        "unterminated placeholder starting at offset {index}"
                    )));
                }
                if let Some(value) = attributes.get(name.trim()) {
                    out.push_str(value);
                }
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

/// Resolves a template against an optional attribute map, treating `None` as
/// an empty map (self-triggered invocations have no flow unit).
///
/// # Errors
///
/// Returns [`ConnectorError::Expression`] for an unterminated `${`.
pub fn resolve_opt(
    template: &str,
    attributes: Option<&HashMap<String, String>>,
) -> ConnectorResult<String> {
    static EMPTY: std::sync::OnceLock<HashMap<String, String>> = std::sync::OnceLock::new();
    resolve(
        template,
        attributes.unwrap_or_else(|| EMPTY.get_or_init(HashMap::new)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_plain_text_unchanged() {
        let resolved = resolve("FOR d IN c RETURN d", &HashMap::new()).unwrap();
        assert_eq!(resolved, "FOR d IN c RETURN d");
    }

    #[test]
    fn test_placeholder_resolved() {
        let resolved = resolve(
            "FOR d IN ${collection} RETURN d",
            &attrs(&[("collection", "users")]),
        )
        .unwrap();
        assert_eq!(resolved, "FOR d IN users RETURN d");
    }

    #[test]
    fn test_unknown_attribute_resolves_empty() {
        let resolved = resolve("db-${env}", &HashMap::new()).unwrap();
        assert_eq!(resolved, "db-");
    }

    #[test]
    fn test_multiple_placeholders() {
        let resolved = resolve(
            "${db}/${col}",
            &attrs(&[("db", "prod"), ("col", "events")]),
        )
        .unwrap();
        assert_eq!(resolved, "prod/events");
    }

    #[test]
    fn test_escaped_dollar() {
        let resolved = resolve("cost: $$5", &HashMap::new()).unwrap();
        assert_eq!(resolved, "cost: $5");
    }

    #[test]
    fn test_lone_dollar_kept() {
        let resolved = resolve("a$b", &HashMap::new()).unwrap();
        assert_eq!(resolved, "a$b");
    }

    #[test]
    fn test_unterminated_placeholder_fails() {
        let err = resolve("FOR d IN ${collection", &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConnectorError::Expression(_)));
    }

    #[test]
    fn test_resolve_opt_without_attributes() {
        assert_eq!(resolve_opt("static", None).unwrap(), "static");
        assert_eq!(resolve_opt("${x}", None).unwrap(), "");
    }

    #[test]
    fn test_whitespace_in_placeholder_trimmed() {
        let resolved = resolve("${ name }", &attrs(&[("name", "v")])).unwrap();
        assert_eq!(resolved, "v");
    }
}
