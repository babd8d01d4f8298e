//! URL normalization — the canonical identity used for de-duplication
//! lookups on `url` items (spec §4.3, scenario §8.1).
//!
//! Rules: strip default ports (80/443), drop a trailing slash unless the
//! path is root, sort query parameters by key, preserve the fragment.

use crate::error::{PeekError, Result};

pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PeekError::validation("url content must not be empty"));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| PeekError::validation(format!("invalid url: {e}")))?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    let host = parsed
        .host_str()
        .ok_or_else(|| PeekError::validation("url must have a host"))?
        .to_ascii_lowercase();

    let is_default_port = matches!(
        (scheme.as_str(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    );
    let port_part = match parsed.port() {
        Some(p) if !is_default_port => format!(":{p}"),
        _ => String::new(),
    };

    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path.is_empty() {
        path.push('/');
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let joined = pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("?{joined}")
    };

    let fragment = match parsed.fragment() {
        Some(f) if !f.is_empty() => format!("#{f}"),
        _ => String::new(),
    };

    Ok(format!(
        "{scheme}://{host}{port_part}{path}{query}{fragment}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_port_trailing_slash_and_query_order() {
        let out = normalize_url("HTTPS://Example.com:443/a/?b=2&a=1#x").unwrap();
        assert_eq!(out, "https://example.com/a?a=1&b=2#x");
    }

    #[test]
    fn preserves_root_path() {
        let out = normalize_url("https://example.com").unwrap();
        assert_eq!(out, "https://example.com/");
    }

    #[test]
    fn keeps_non_default_port() {
        let out = normalize_url("http://example.com:8080/x/").unwrap();
        assert_eq!(out, "http://example.com:8080/x");
    }

    #[test]
    fn rejects_empty() {
        assert!(normalize_url("   ").is_err());
    }

    #[test]
    fn equivalent_urls_normalize_identically() {
        let a = normalize_url("https://example.com/a?a=1&b=2").unwrap();
        let b = normalize_url("https://EXAMPLE.com:443/a?b=2&a=1").unwrap();
        assert_eq!(a, b);
    }
}
