//! URL pattern extractor.

use std::collections::BTreeSet;

use regex::Regex;

use super::{SignalDomain, SignalExtractor, collect};
use crate::engine::{EngineError, EngineResult};
use crate::plugin::PluginId;
use crate::request::RequestContext;
use crate::rules::{REGEX_PREFIX, UrlRule};

#[derive(Debug)]
enum UrlMatcher {
    Substring(String),
    Regex(Regex),
}

impl UrlMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Substring(needle) => path.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(path),
        }
    }
}

/// Matches the normalized request path against the ordered URL table.
///
/// Every matching row contributes (union semantics).
#[derive(Debug)]
pub struct UrlExtractor {
    rules: Vec<(UrlMatcher, Vec<PluginId>)>,
}

impl UrlExtractor {
    /// Compile the URL table. Substring patterns are lowercased to match
    /// the normalized path.
    pub fn from_rules(rules: &[UrlRule]) -> EngineResult<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let matcher = match rule.pattern.strip_prefix(REGEX_PREFIX) {
                    Some(re) => UrlMatcher::Regex(Regex::new(re).map_err(|e| {
                        EngineError::InvalidPattern {
                            pattern: rule.pattern.clone(),
                            details: e.to_string(),
                        }
                    })?),
                    None => UrlMatcher::Substring(rule.pattern.to_lowercase()),
                };
                Ok::<_, EngineError>((matcher, rule.plugins.clone()))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Plugins for an already-normalized path.
    pub fn match_path(&self, path: &str) -> BTreeSet<PluginId> {
        let mut out = BTreeSet::new();
        for (matcher, plugins) in &self.rules {
            if matcher.matches(path) {
                collect(&mut out, plugins);
            }
        }
        out
    }
}

impl SignalExtractor for UrlExtractor {
    fn name(&self) -> &'static str {
        "url"
    }

    fn domain(&self) -> SignalDomain {
        SignalDomain::Url
    }

    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId> {
        self.match_path(&ctx.normalized_path())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn rule(pattern: &str, plugins: &[&str]) -> UrlRule {
        UrlRule {
            pattern: pattern.into(),
            plugins: plugins.iter().map(|p| PluginId::new(*p)).collect(),
        }
    }

    #[test]
    fn substring_and_regex_rows_union() {
        let extractor = UrlExtractor::from_rules(&[
            rule("/shop/", &["woocommerce"]),
            rule("re:^/shop/sale/", &["sale-banner"]),
        ])
        .unwrap();

        let found = extractor.extract(&RequestContext::new("/Shop/Sale/?ref=x"));
        assert_eq!(
            found,
            BTreeSet::from([PluginId::new("sale-banner"), PluginId::new("woocommerce")])
        );
    }

    #[test]
    fn substring_pattern_is_case_insensitive() {
        let extractor = UrlExtractor::from_rules(&[rule("/Events/", &["cal"])]).unwrap();
        assert_eq!(extractor.match_path("/events/2024/"), BTreeSet::from([PluginId::new("cal")]));
    }

    #[test]
    fn no_match_is_empty() {
        let extractor = UrlExtractor::from_rules(&[rule("/shop/", &["woocommerce"])]).unwrap();
        assert!(extractor.match_path("/about/").is_empty());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let result = UrlExtractor::from_rules(&[rule("re:([", &["x"])]);
        assert!(matches!(result, Err(EngineError::InvalidPattern { .. })));
    }

    #[test]
    fn deterministic_for_same_path() {
        let extractor = UrlExtractor::from_rules(&[
            rule("/a/", &["z", "y"]),
            rule("re:/a/b", &["x"]),
        ])
        .unwrap();
        assert_eq!(extractor.match_path("/a/b/"), extractor.match_path("/a/b/"));
    }
}
