//! Decides which storage keys belong in the search index.
//!
//! The filter is an ordered list of [`EligibilityRule`] values. Rules are
//! evaluated in order and the first rule that rejects a key wins; a key no
//! rule rejects is eligible. New exclusions are added by pushing rules, not
//! by touching the evaluation loop.

use crate::error::ConfigError;
use regex::Regex;

pub const DEFAULT_DOCUMENT_SUFFIX: &str = ".html";
pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";

#[derive(Debug, Clone)]
pub enum KeyPattern {
    EndsWith(String),
    Contains(String),
    Regex(Regex),
}

impl KeyPattern {
    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Self::EndsWith(suffix.into())
    }

    pub fn contains(fragment: impl Into<String>) -> Self {
        Self::Contains(fragment.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::EndsWith(suffix) => key.ends_with(suffix.as_str()),
            Self::Contains(fragment) => key.contains(fragment.as_str()),
            Self::Regex(pattern) => pattern.is_match(key),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EligibilityRule {
    /// Rejects keys that do not end with the document suffix.
    RequireSuffix(String),
    /// Rejects directory index documents unless allow-listed. Deny patterns
    /// are checked before allow patterns.
    IndexDocument {
        name: String,
        allow: Vec<KeyPattern>,
        deny: Vec<KeyPattern>,
    },
    /// Rejects keys matching the pattern.
    Exclude { pattern: KeyPattern, reason: String },
}

impl EligibilityRule {
    pub fn exclude(pattern: KeyPattern, reason: impl Into<String>) -> Self {
        Self::Exclude {
            pattern,
            reason: reason.into(),
        }
    }

    /// Returns the rejection reason, or `None` when the rule lets the key through.
    fn reject(&self, key: &str) -> Option<String> {
        match self {
            Self::RequireSuffix(suffix) => {
                (!key.ends_with(suffix.as_str())).then(|| format!("key does not end with {suffix}"))
            }
            Self::IndexDocument { name, allow, deny } => {
                if !key.ends_with(name.as_str()) {
                    return None;
                }
                if deny.iter().any(|pattern| pattern.matches(key)) {
                    return Some(format!("{name} is explicitly excluded"));
                }
                if allow.iter().any(|pattern| pattern.matches(key)) {
                    return None;
                }
                Some(format!("{name} is not allow-listed"))
            }
            Self::Exclude { pattern, reason } => pattern.matches(key).then(|| reason.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    rules: Vec<EligibilityRule>,
}

impl EligibilityFilter {
    pub fn new(rules: Vec<EligibilityRule>) -> Self {
        Self { rules }
    }

    /// Rule set used for the production site.
    pub fn site_defaults(document_suffix: &str) -> Self {
        Self::new(vec![
            EligibilityRule::RequireSuffix(document_suffix.to_string()),
            EligibilityRule::IndexDocument {
                name: DEFAULT_INDEX_DOCUMENT.to_string(),
                allow: vec![
                    KeyPattern::ends_with("price/index.html"),
                    KeyPattern::ends_with("service/index.html"),
                ],
                deny: vec![KeyPattern::ends_with("information/service/index.html")],
            },
            EligibilityRule::exclude(KeyPattern::ends_with("maintenance.html"), "maintenance page"),
            EligibilityRule::exclude(KeyPattern::ends_with("search_result.html"), "search results page"),
            EligibilityRule::exclude(KeyPattern::contains("error/"), "error page"),
            EligibilityRule::exclude(KeyPattern::contains("index_"), "index listing page"),
            EligibilityRule::exclude(
                KeyPattern::contains("inquiry_form_comp.html"),
                "inquiry confirmation page",
            ),
            EligibilityRule::exclude(KeyPattern::contains("logout.html"), "logout page"),
        ])
    }

    pub fn push(&mut self, rule: EligibilityRule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: EligibilityRule) -> Self {
        self.push(rule);
        self
    }

    pub fn evaluate(&self, key: &str) -> Eligibility {
        self.rules
            .iter()
            .find_map(|rule| rule.reject(key))
            .map_or(Eligibility::Eligible, Eligibility::Skip)
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::site_defaults(DEFAULT_DOCUMENT_SUFFIX)
    }
}
