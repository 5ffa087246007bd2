//! Content structure extractor: shortcodes and block comments.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{SignalDomain, SignalExtractor, collect};
use crate::plugin::PluginId;
use crate::request::RequestContext;
use crate::rules::{TokenTable, lookup};

/// Opening shortcode tag. Group 1 is non-empty for escaped `[[name]]`.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\[?)([A-Za-z0-9_-]+)(?:[\s/\]])").expect("valid regex literal")
});

/// Opening block comment `<!-- wp:namespace/name`. Group 2 is absent for
/// core blocks written without a namespace.
///
/// # Panics
///
/// Panics if the hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s+wp:([a-z][a-z0-9_-]*)(?:/([a-z][a-z0-9_-]*))?").expect("valid regex literal")
});

/// Scans raw post content for shortcode tokens and block comments.
///
/// Block names are looked up in full (`namespace/name`) and then by
/// namespace alone. Unrecognized tokens are ignored.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    shortcodes: TokenTable,
    blocks: TokenTable,
}

impl ContentExtractor {
    pub fn new(shortcodes: TokenTable, blocks: TokenTable) -> Self {
        Self { shortcodes, blocks }
    }

    /// Shortcode names opened in `body`, skipping escaped ones.
    pub fn shortcode_names(body: &str) -> BTreeSet<&str> {
        SHORTCODE
            .captures_iter(body)
            .filter(|caps| caps.get(1).is_none_or(|m| m.as_str().is_empty()))
            .filter_map(|caps| caps.get(2).map(|m| m.as_str()))
            .collect()
    }

    /// `(namespace, full name)` of every block opened in `body`.
    pub fn block_names(body: &str) -> BTreeSet<(String, String)> {
        BLOCK
            .captures_iter(body)
            .filter_map(|caps| {
                let first = caps.get(1)?.as_str();
                Some(match caps.get(2) {
                    Some(name) => (first.to_string(), format!("{first}/{}", name.as_str())),
                    None => ("core".to_string(), format!("core/{first}")),
                })
            })
            .collect()
    }

    /// Plugins referenced by a body of markup.
    pub fn scan(&self, body: &str) -> BTreeSet<PluginId> {
        let mut out = BTreeSet::new();
        if body.is_empty() {
            return out;
        }

        if body.contains('[') {
            for name in Self::shortcode_names(body) {
                collect(&mut out, lookup(&self.shortcodes, name));
            }
        }

        if body.contains("<!--") {
            for (namespace, full) in Self::block_names(body) {
                match self.blocks.get(&full) {
                    Some(plugins) => collect(&mut out, plugins),
                    None => collect(&mut out, lookup(&self.blocks, &namespace)),
                }
            }
        }

        out
    }
}

impl SignalExtractor for ContentExtractor {
    fn name(&self) -> &'static str {
        "content"
    }

    fn domain(&self) -> SignalDomain {
        SignalDomain::Content
    }

    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId> {
        ctx.content
            .as_ref()
            .map(|c| self.scan(&c.body))
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn extractor() -> ContentExtractor {
        let mut shortcodes = TokenTable::new();
        shortcodes.insert("contact-form-7".into(), vec![PluginId::new("contact-form-7")]);
        shortcodes.insert("products".into(), vec![PluginId::new("woocommerce")]);

        let mut blocks = TokenTable::new();
        blocks.insert("woocommerce".into(), vec![PluginId::new("woocommerce")]);
        blocks.insert("jet-engine/listing-grid".into(), vec![PluginId::new("jet-engine")]);
        blocks.insert("core/gallery".into(), vec![PluginId::new("gallery-plus")]);

        ContentExtractor::new(shortcodes, blocks)
    }

    #[test]
    fn finds_shortcodes() {
        let body = r#"<p>Reach us:</p>[contact-form-7 id="12" title="Contact"] and [products limit="4"]"#;
        assert_eq!(
            extractor().scan(body),
            BTreeSet::from([PluginId::new("contact-form-7"), PluginId::new("woocommerce")])
        );
    }

    #[test]
    fn escaped_and_closing_shortcodes_are_ignored() {
        let names = ContentExtractor::shortcode_names("[[products]] [/products] [gallery/]");
        assert_eq!(names, BTreeSet::from(["gallery"]));
    }

    #[test]
    fn finds_blocks_by_full_name_and_namespace() {
        let body = concat!(
            "<!-- wp:woocommerce/product-price {\"id\":3} /-->\n",
            "<!-- wp:jet-engine/listing-grid -->x<!-- /wp:jet-engine/listing-grid -->\n",
            "<!-- wp:gallery -->",
        );
        assert_eq!(
            extractor().scan(body),
            [
                PluginId::new("gallery-plus"),
                PluginId::new("jet-engine"),
                PluginId::new("woocommerce"),
            ]
            .into()
        );
    }

    #[test]
    fn unknown_tokens_are_ignored() {
        let body = "[unknown_thing a=1] <!-- wp:paragraph --><p>hi</p><!-- /wp:paragraph -->";
        assert!(extractor().scan(body).is_empty());
    }

    #[test]
    fn empty_content_is_empty() {
        assert!(extractor().scan("").is_empty());
        assert!(extractor().extract(&RequestContext::new("/")).is_empty());
    }
}
