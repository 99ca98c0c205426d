use std::fmt;

/// Matches dot-separated subjects against a subscription pattern.
///
/// `*` matches exactly one token, `>` matches one or more trailing tokens.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct SubjectMatcher {
    pattern: String,
    tokens: Vec<String>,
}

impl SubjectMatcher {
    pub(crate) fn new(pattern: &str) -> Self {
        let tokens = pattern
            .split('.')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self {
            pattern: pattern.to_string(),
            tokens,
        }
    }

    pub(crate) fn matches(&self, subject: &str) -> bool {
        let mut subject_tokens = subject.split('.').filter(|s| !s.is_empty());

        for token in &self.tokens {
            match token.as_str() {
                ">" => return subject_tokens.next().is_some(),
                "*" => {
                    if subject_tokens.next().is_none() {
                        return false;
                    }
                }
                literal => match subject_tokens.next() {
                    Some(candidate) if candidate == literal => {}
                    _ => return false,
                },
            }
        }

        subject_tokens.next().is_none()
    }
}

impl fmt::Display for SubjectMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let matcher = SubjectMatcher::new("orders.created");
        assert!(matcher.matches("orders.created"));
        assert!(!matcher.matches("orders.deleted"));
        assert!(!matcher.matches("orders"));
        assert!(!matcher.matches("orders.created.eu"));
    }

    #[test]
    fn test_single_token_wildcard() {
        let matcher = SubjectMatcher::new("orders.*");
        assert!(matcher.matches("orders.created"));
        assert!(matcher.matches("orders.deleted"));
        assert!(!matcher.matches("orders"));
        assert!(!matcher.matches("orders.created.eu"));
    }

    #[test]
    fn test_tail_wildcard() {
        let matcher = SubjectMatcher::new("orders.>");
        assert!(matcher.matches("orders.created"));
        assert!(matcher.matches("orders.created.eu.west"));
        assert!(!matcher.matches("orders"));
    }

    #[test]
    fn test_mixed_pattern() {
        let matcher = SubjectMatcher::new("region.*.orders.>");
        assert!(matcher.matches("region.eu.orders.created"));
        assert!(matcher.matches("region.us.orders.created.late"));
        assert!(!matcher.matches("region.eu.orders"));
        assert!(!matcher.matches("region.eu.invoices.created"));
    }
}
