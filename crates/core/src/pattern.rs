//! Wildcard resource patterns.
//!
//! `*` alone matches every resource. A pattern containing `*` matches when
//! the whole resource string matches the pattern with each `*` read as
//! "any run of characters". Everything else is compared for equality.
use regex::Regex;

#[derive(Debug, Clone)]
pub enum WildcardPattern {
    Any,
    Exact(String),
    Glob { source: String, regex: Regex },
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Self {
        if pattern == "*" {
            return WildcardPattern::Any;
        }
        if !pattern.contains('*') {
            return WildcardPattern::Exact(pattern.to_owned());
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        match Regex::new(&format!("^(?s:{})$", body)) {
            Ok(regex) => WildcardPattern::Glob {
                source: pattern.to_owned(),
                regex,
            },
            // Escaped input always compiles; fall back to equality regardless.
            Err(_) => WildcardPattern::Exact(pattern.to_owned()),
        }
    }

    pub fn matches(&self, resource: &str) -> bool {
        match self {
            WildcardPattern::Any => true,
            WildcardPattern::Exact(p) => p == resource,
            WildcardPattern::Glob { regex, .. } => regex.is_match(resource),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WildcardPattern::Any => "*",
            WildcardPattern::Exact(p) => p,
            WildcardPattern::Glob { source, .. } => source,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, WildcardPattern::Exact(_))
    }
}

/// One-off match without keeping the compiled pattern.
pub fn wildcard_match(pattern: &str, resource: &str) -> bool {
    WildcardPattern::new(pattern).matches(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        assert!(wildcard_match("*", "db.orders"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn trailing_wildcard_matches_children_only() {
        let p = WildcardPattern::new("db.*");
        assert!(p.matches("db.orders"));
        assert!(p.matches("db.users"));
        assert!(!p.matches("other.orders"));
        // the dot is literal
        assert!(!p.matches("dbxorders"));
    }

    #[test]
    fn inner_wildcards_and_paths() {
        assert!(wildcard_match("api.*.read", "api.users.read"));
        assert!(!wildcard_match("api.*.read", "api.users.write"));
        assert!(wildcard_match("/data/*", "/data/reports/2024"));
    }

    #[test]
    fn no_wildcard_means_equality() {
        let p = WildcardPattern::new("DB");
        assert!(!p.is_wildcard());
        assert!(p.matches("DB"));
        assert!(!p.matches("db"));
        assert!(!p.matches("DB.x"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        assert!(wildcard_match("files(1)+*", "files(1)+a"));
        assert!(!wildcard_match("a+*", "aa"));
    }
}
