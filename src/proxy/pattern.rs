//! Method name patterns

use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// Matches intercepted method names.
#[derive(Clone)]
pub enum MethodPattern {
    /// Every method.
    Any,
    /// Exact method name.
    Exact(String),
    /// Method names starting with the prefix.
    Prefix(String),
    /// Regular expression that must match the whole method name.
    Regex(Regex),
}

impl MethodPattern {
    pub fn any() -> Self {
        MethodPattern::Any
    }

    pub fn exact(name: impl Into<String>) -> Self {
        MethodPattern::Exact(name.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        MethodPattern::Prefix(prefix.into())
    }

    /// Compile a full-match regular expression, e.g. `set.*` or `execute|commit`.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(&format!("^(?:{})$", pattern))
            .map(MethodPattern::Regex)
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn matches(&self, method_name: &str) -> bool {
        match self {
            MethodPattern::Any => true,
            MethodPattern::Exact(name) => name == method_name,
            MethodPattern::Prefix(prefix) => method_name.starts_with(prefix.as_str()),
            MethodPattern::Regex(regex) => regex.is_match(method_name),
        }
    }
}

impl fmt::Debug for MethodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodPattern::Any => write!(f, "Any"),
            MethodPattern::Exact(name) => write!(f, "Exact({})", name),
            MethodPattern::Prefix(prefix) => write!(f, "Prefix({})", prefix),
            MethodPattern::Regex(regex) => write!(f, "Regex({})", regex.as_str()),
        }
    }
}

impl TryFrom<&str> for MethodPattern {
    type Error = Error;

    fn try_from(pattern: &str) -> Result<Self> {
        MethodPattern::regex(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_exact() {
        let pattern = MethodPattern::exact("close");
        assert!(pattern.matches("close"));
        assert!(!pattern.matches("closeAll"));
    }

    #[test]
    fn test_prefix_and_any() {
        assert!(MethodPattern::prefix("set_").matches("set_int"));
        assert!(!MethodPattern::prefix("set_").matches("reset_int"));
        assert!(MethodPattern::any().matches("anything"));
    }

    #[test]
    fn test_regex_is_full_match() {
        let pattern = MethodPattern::regex("set.*").unwrap();
        assert!(pattern.matches("set_int"));
        assert!(!pattern.matches("reset"));

        let alt = MethodPattern::try_from("commit|rollback").unwrap();
        assert!(alt.matches("commit"));
        assert!(alt.matches("rollback"));
        assert!(!alt.matches("commit_all"));
    }

    #[test]
    fn test_invalid_regex() {
        assert_matches!(
            MethodPattern::regex("set(("),
            Err(Error::InvalidPattern { ref pattern, .. }) if pattern == "set(("
        );
    }
}
