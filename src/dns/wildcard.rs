//! Wildcard domain patterns
//!
//! A `*` in a domain pattern matches any run of characters, including dots,
//! so `*.com` covers `www.google.com` as well as `google.com`. Patterns are
//! compiled once into anchored regexes and kept for the life of the store.

use std::collections::BTreeMap;

use regex::Regex;

pub fn is_wildcard(domain: &str) -> bool {
    domain.contains('*')
}

/// Translates a wildcard into an anchored regex, escaping everything but `*`.
pub fn wildcard_to_regex_string(wildcard: &str) -> String {
    let parts: Vec<String> = wildcard.split('*').map(regex::escape).collect();
    format!("^{}$", parts.join(".*"))
}

/// Compiled wildcards keyed by their original pattern.
#[derive(Default)]
pub struct WildcardSet {
    patterns: BTreeMap<String, Regex>,
}

impl WildcardSet {
    pub fn new() -> WildcardSet {
        WildcardSet {
            patterns: BTreeMap::new(),
        }
    }

    /// Returns the compiled matcher for `wildcard`, compiling it on first use.
    pub fn get_or_compile(&mut self, wildcard: &str) -> &Regex {
        if !self.patterns.contains_key(wildcard) {
            let source = wildcard_to_regex_string(wildcard);
            // Every literal piece is escaped, so the only metacharacters left are ours.
            let regex = match Regex::new(&source) {
                Ok(regex) => regex,
                Err(e) => panic!("couldn't compile regex {} for wildcard {}: {}", source, wildcard, e),
            };
            log::debug!("Compiled wildcard {} as {}", wildcard, source);
            self.patterns.insert(wildcard.to_string(), regex);
        }

        &self.patterns[wildcard]
    }

    /// Every known wildcard that matches `name`.
    pub fn matching(&self, name: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(name))
            .map(|(wildcard, _)| wildcard.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifies_wildcards() {
        assert!(is_wildcard("*.com"));
        assert!(is_wildcard("update.*.tigera.io"));
        assert!(!is_wildcard(".com"));
        assert!(!is_wildcard("google.com"));
        assert!(!is_wildcard("cpanel.blog.org"));
    }

    #[test]
    fn test_regex_strings() {
        assert_eq!(wildcard_to_regex_string("*.com"), r"^.*\.com$");
        assert_eq!(wildcard_to_regex_string("*.google.com"), r"^.*\.google\.com$");
        assert_eq!(
            wildcard_to_regex_string("update.*.tigera.io"),
            r"^update\..*\.tigera\.io$"
        );
    }

    #[test]
    fn test_matching() {
        let mut set = WildcardSet::new();

        let com = set.get_or_compile("*.com").clone();
        assert!(com.is_match("google.com"));
        assert!(com.is_match("www.google.com"));
        assert!(!com.is_match("com"));
        assert!(!com.is_match("tigera.io"));

        let google = set.get_or_compile("*.google.com").clone();
        assert!(google.is_match("update.google.com"));
        assert!(google.is_match("www.update.google.com"));
        assert!(!google.is_match("google.com"));
        assert!(!google.is_match("www.googleacom"));

        let mid = set.get_or_compile("update.*.tigera.io").clone();
        assert!(mid.is_match("update.calico.tigera.io"));
        assert!(mid.is_match("update.a.b.tigera.io"));
        assert!(!mid.is_match("update.tigera.io"));
        assert!(!mid.is_match("www.calico.tigera.io"));
    }

    #[test]
    fn test_compiled_once() {
        let mut set = WildcardSet::new();
        set.get_or_compile("*.com");
        set.get_or_compile("*.com");
        set.get_or_compile("*.io");
        assert_eq!(set.len(), 2);

        assert_eq!(set.matching("www.google.com"), vec!["*.com".to_string()]);
        assert!(set.matching("localhost").is_empty());
    }
}
