//! URL helpers for manifest and API image references.

use serde_json::Value;

/// Keys that hold a URL when an image is given as a dict.
const URL_KEYS: &[&str] = &["image_url", "url", "href", "src", "original"];

const GOG_ORIGIN: &str = "https://www.gog.com";

/// Normalizes an image reference to an absolute https URL.
///
/// `//host/x` gets an `https:` scheme, `/x` is resolved against
/// www.gog.com, and anything without a scheme is assumed to be a host.
/// Returns `None` for blank input.
pub fn abs_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    let abs = if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("{GOG_ORIGIN}{url}")
    } else if !url.to_ascii_lowercase().starts_with("http") {
        format!("https://{url}")
    } else {
        url.to_string()
    };
    Some(abs)
}

/// Returns the URL a value refers to: the string itself, or the first
/// non-empty URL-like field of a dict.
pub fn url_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(obj) => pick_str(obj, URL_KEYS),
        _ => None,
    }
}

/// First non-empty string among `keys`.
pub fn pick_str(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k)?.as_str())
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// URL-like fields of an image dict, in preference order.
pub fn url_keys() -> &'static [&'static str] {
    URL_KEYS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn abs(url: &str) -> String {
        abs_url(url).unwrap_or_default()
    }

    #[test]
    fn abs_url_forms() {
        assert_eq!(abs("//images.gog.com/a.jpg"), "https://images.gog.com/a.jpg");
        assert_eq!(abs("/upload/a.png"), "https://www.gog.com/upload/a.png");
        assert_eq!(abs("images.gog.com/a.jpg"), "https://images.gog.com/a.jpg");
        assert_eq!(abs(" http://x/y "), "http://x/y");
        assert_eq!(abs("HTTPS://X/y"), "HTTPS://X/y");
        assert_eq!(abs_url("   "), None);
    }

    #[test]
    fn url_from_string_or_dict() {
        assert_eq!(url_from_value(&json!("a")).as_deref(), Some("a"));
        assert_eq!(
            url_from_value(&json!({"href": "", "src": "b"})).as_deref(),
            Some("b")
        );
        assert_eq!(url_from_value(&json!({"width": 3})), None);
        assert_eq!(url_from_value(&json!(5)), None);
        assert_eq!(url_from_value(&json!("")), None);
    }
}
