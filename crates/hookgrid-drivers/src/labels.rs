//! Label selector matching shared by the host and service drivers.

use hookgrid_platform::Labels;

/// Whether `labels` satisfy every entry of `selector`.
///
/// Keys and values compare case-insensitively. A selector entry with an
/// empty value only requires the key to be present.
pub fn matches(selector: &Labels, labels: &Labels) -> bool {
    selector.iter().all(|(key, value)| {
        labels
            .iter()
            .any(|(k, v)| eq_fold(k, key) && (value.is_empty() || eq_fold(v, value)))
    })
}

fn eq_fold(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn key_and_value_ignore_case() {
        let selector = labels(&[("Tier", "WEB")]);
        assert!(matches(&selector, &labels(&[("tier", "web"), ("zone", "a")])));
        assert!(!matches(&selector, &labels(&[("tier", "db")])));
    }

    #[test]
    fn empty_value_matches_presence() {
        let selector = labels(&[("canary", "")]);
        assert!(matches(&selector, &labels(&[("CANARY", "anything")])));
        assert!(!matches(&selector, &labels(&[("stable", "true")])));
    }

    #[test]
    fn every_selector_entry_is_required() {
        let selector = labels(&[("app", "api"), ("env", "prod")]);
        assert!(!matches(&selector, &labels(&[("app", "api")])));
        assert!(matches(&selector, &labels(&[("env", "prod"), ("app", "API")])));
    }
}
