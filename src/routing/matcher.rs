//! Path matching.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A prefix matches on segment boundaries: `/api` matches `/api` and
//!   `/api/v1`, never `/apiary`
//! - No regex to guarantee O(n) matching

/// Matches the request path against a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// A trailing slash is dropped so `/api/` and `/api` behave the same.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Length of the prefix, used to break ties between equal priorities.
    pub fn specificity(&self) -> usize {
        self.prefix.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");
        assert!(matcher.matches("/api"));
        assert!(matcher.matches("/api/v1"));
        assert!(!matcher.matches("/apiary"));
        assert!(!matcher.matches("/images"));
    }

    #[test]
    fn test_trailing_slash_is_normalized() {
        let matcher = PathPrefixMatcher::new("/api/");
        assert_eq!(matcher.prefix(), "/api");
        assert!(matcher.matches("/api/payments"));
    }

    #[test]
    fn test_root_matches_everything() {
        let matcher = PathPrefixMatcher::new("/");
        assert!(matcher.matches("/"));
        assert!(matcher.matches("/anything/at/all"));
    }

    #[test]
    fn test_case_sensitive() {
        assert!(!PathPrefixMatcher::new("/API").matches("/api"));
    }
}
