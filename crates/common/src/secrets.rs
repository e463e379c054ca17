//! Secret detection shared by the linter and the importer

use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed replacement for masked values in artifacts and logs.
pub const MASK: &str = "***";

/// Keywords that mark a field as credential-bearing. Case-insensitive,
/// includes the Japanese localizations the tool's target apps use.
static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passphrase|secret|token|credential|api[_-]?key|pin|パスワード|トークン|暗証)")
        .unwrap()
});

/// True when a human-identifying string (label, placeholder, name, id)
/// suggests the associated value is a secret.
pub fn is_secret_hint(text: &str) -> bool {
    SECRET_PATTERN.is_match(text)
}

/// Replace every occurrence of the given secret values with the mask.
pub fn mask_values(text: &str, secrets: &[String]) -> String {
    let mut out = text.to_string();
    for value in secrets {
        if !value.is_empty() {
            out = out.replace(value, MASK);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_detection_is_case_insensitive_and_localized() {
        assert!(is_secret_hint("Password"));
        assert!(is_secret_hint("API_KEY"));
        assert!(is_secret_hint("apiKey"));
        assert!(is_secret_hint("refresh token"));
        assert!(is_secret_hint("パスワード"));
        assert!(!is_secret_hint("Email"));
        assert!(!is_secret_hint("Search"));
    }

    #[test]
    fn masking_replaces_every_occurrence() {
        let masked = mask_values("hunter2 then hunter2", &["hunter2".to_string()]);
        assert_eq!(masked, "*** then ***");
    }

    #[test]
    fn empty_secret_values_are_ignored() {
        assert_eq!(mask_values("abc", &[String::new()]), "abc");
    }
}
