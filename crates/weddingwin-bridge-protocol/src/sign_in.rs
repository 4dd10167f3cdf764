/// Authorization endpoints that identify a Google OAuth entry point.
pub const GOOGLE_SIGN_IN_PATTERNS: &[&str] = &[
    "accounts.google.com/o/oauth2",
    "accounts.google.com/signin/oauth",
];

/// Which URLs count as sign-in entry points. The page uses it to decide what
/// to delegate; the shell uses it to refuse anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInMatcher {
    patterns: Vec<String>,
}

impl Default for SignInMatcher {
    fn default() -> Self {
        Self::new(GOOGLE_SIGN_IN_PATTERNS.iter().copied())
    }
}

impl SignInMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|pattern| pattern.as_ref().trim().to_ascii_lowercase())
                .filter(|pattern| !pattern.is_empty())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Substring match on host and path, case-insensitive.
    pub fn matches(&self, url: &str) -> bool {
        let lowered = url.trim().to_ascii_lowercase();
        !lowered.is_empty()
            && self
                .patterns
                .iter()
                .any(|pattern| lowered.contains(pattern.as_str()))
    }
}
