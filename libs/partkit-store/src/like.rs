//! SQL `LIKE` patterns for engines without a native `LIKE`.

use regex::Regex;

/// Translate a `LIKE` pattern into an anchored regular expression.
///
/// `%` becomes `.*`, `_` becomes `.`, every other character is matched
/// literally. Matching is case-sensitive.
pub fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    out.push('$');
    out
}

/// Evaluate `value LIKE pattern`.
pub fn like_matches(pattern: &str, value: &str) -> bool {
    // wildcards span newlines as SQL's do
    match Regex::new(&format!("(?s){}", like_to_regex(pattern))) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "like pattern did not compile");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_translate_and_metacharacters_escape() {
        assert_eq!(like_to_regex("Ma%"), "^Ma.*$");
        assert_eq!(like_to_regex("a_c"), "^a.c$");
        assert_eq!(like_to_regex("1+1=(2)"), r"^1\+1=\(2\)$");
    }

    #[test]
    fn matching_is_anchored_and_case_sensitive() {
        assert!(like_matches("%Korhonen", "Matti Korhonen"));
        assert!(!like_matches("Korhonen", "Matti Korhonen"));
        assert!(!like_matches("matti%", "Matti Korhonen"));
        assert!(like_matches("M_tti%", "Matti\nKorhonen"));
        assert!(like_matches("a.c", "a.c"));
        assert!(!like_matches("a.c", "abc"));
    }
}
