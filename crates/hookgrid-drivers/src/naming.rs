//! Clone naming for host scaling.
//!
//! A host name such as `scaleHost007.example.com` splits into a prefix
//! (`scaleHost`), a numeric suffix (`007`) and a domain (`.example.com`).
//! Clones keep prefix and domain and count the suffix upward, preserving
//! its zero-padded width.

/// A host name split into its naming parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostName<'a> {
    pub prefix: &'a str,
    pub suffix: &'a str,
    /// Everything from the first `.`, including the dot.
    pub domain: &'a str,
}

impl<'a> HostName<'a> {
    pub fn parse(name: &'a str) -> Self {
        let (label, domain) = match name.find('.') {
            Some(dot) => name.split_at(dot),
            None => (name, ""),
        };
        let digits_at = label.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (prefix, suffix) = label.split_at(digits_at);
        Self {
            prefix,
            suffix,
            domain,
        }
    }

    /// Full name with a different numeric suffix.
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}{}", self.prefix, suffix, self.domain)
    }
}

/// The suffix following `current`.
///
/// An empty suffix is followed by `"2"`. Otherwise the decimal value is
/// incremented and left-padded with zeros to the original width, growing
/// only when the width overflows (`"007"` → `"008"`, `"99"` → `"100"`).
pub fn next_suffix(current: &str) -> String {
    if current.is_empty() {
        return "2".to_string();
    }

    let mut digits = current.as_bytes().to_vec();
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return String::from_utf8_lossy(&digits).into_owned();
        }
    }
    format!("1{}", String::from_utf8_lossy(&digits))
}

/// `count` successive clone names after the high-water suffix, generated
/// one at a time.
pub fn clone_names<'a>(
    base: HostName<'a>,
    high_water: &'a str,
    count: usize,
) -> impl Iterator<Item = String> + 'a {
    let mut suffix = high_water.to_string();
    (0..count).map(move |_| {
        suffix = next_suffix(&suffix);
        base.with_suffix(&suffix)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_prefix_suffix_domain() {
        let name = HostName::parse("scaleHost12.foo.com");
        assert_eq!(name.prefix, "scaleHost");
        assert_eq!(name.suffix, "12");
        assert_eq!(name.domain, ".foo.com");

        let bare = HostName::parse("web");
        assert_eq!((bare.prefix, bare.suffix, bare.domain), ("web", "", ""));
    }

    #[test]
    fn digits_inside_prefix_stay_in_prefix() {
        let name = HostName::parse("node1a03");
        assert_eq!(name.prefix, "node1a");
        assert_eq!(name.suffix, "03");
    }

    #[test]
    fn suffix_keeps_width() {
        assert_eq!(next_suffix("007"), "008");
        assert_eq!(next_suffix("009"), "010");
        assert_eq!(next_suffix("12"), "13");
        assert_eq!(next_suffix("99"), "100");
        assert_eq!(next_suffix(""), "2");
    }

    #[test]
    fn clone_names_count_upward() {
        let base = HostName::parse("scaleHost007");
        assert_eq!(
            clone_names(base, base.suffix, 2).collect::<Vec<_>>(),
            ["scaleHost008", "scaleHost009"]
        );

        let web = HostName::parse("web.example.com");
        assert_eq!(
            clone_names(web, web.suffix, 2).collect::<Vec<_>>(),
            ["web2.example.com", "web3.example.com"]
        );

        let mut huge = clone_names(base, base.suffix, usize::MAX);
        assert_eq!(huge.next().as_deref(), Some("scaleHost008"));
    }
}
