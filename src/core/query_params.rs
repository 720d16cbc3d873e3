use std::collections::HashMap;

/// Parse query parameters from a URI or raw query string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use concert_diary::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/?bands=1,2&sort=dateDsc");
/// assert_eq!(params.get("bands"), Some(&"1,2".to_string()));
/// assert_eq!(params.get("sort"), Some(&"dateDsc".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let query = match uri.find('?') {
        Some(query_start) => &uri[query_start + 1..],
        None if uri.contains('=') => uri,
        None => return params,
    };

    for param in query.split('&').filter(|p| !p.is_empty()) {
        if let Some(eq_idx) = param.find('=') {
            let key = &param[..eq_idx];
            let encoded_value = &param[eq_idx + 1..];
            let decoded = urlencoding::decode(encoded_value)
                .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                .to_string();
            params.insert(key.to_string(), decoded);
        } else {
            // Flag parameter without value
            params.insert(param.to_string(), String::new());
        }
    }

    params
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params
        .get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}

/// Get a boolean flag parameter (e.g., ?confirm=true)
pub fn get_bool_flag(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key).map(|v| v == "true").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values_and_flags() {
        let params = parse_query_params("/api/comments/3?confirm=true&note=a%20b&raw");
        assert!(get_bool_flag(&params, "confirm"));
        assert_eq!(get_string(&params, "note", None).as_deref(), Some("a b"));
        assert_eq!(params.get("raw"), Some(&String::new()));
    }

    #[test]
    fn bare_query_string_is_accepted() {
        let params = parse_query_params("sort=dateDsc");
        assert_eq!(get_string(&params, "sort", Some("dateAsc")).as_deref(), Some("dateDsc"));
        assert_eq!(get_string(&params, "bands", Some("")).as_deref(), Some(""));
        assert!(parse_query_params("/").is_empty());
    }
}
