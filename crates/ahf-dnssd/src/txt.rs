//! DNS-SD TXT attributes: one `key=value` character-string per pair
//! (RFC 6763 §6). Keys are matched case-insensitively; the first `=`
//! splits; a value may be empty; a string without `=` is a boolean-style
//! key with an empty value.

pub fn encode(attributes: &[(String, String)]) -> Vec<String> {
    attributes
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect()
}

pub fn decode(strings: &[String]) -> Vec<(String, String)> {
    strings
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once('=') {
            Some((key, value)) => (key.to_ascii_lowercase(), value.to_string()),
            None => (s.to_ascii_lowercase(), String::new()),
        })
        .collect()
}
