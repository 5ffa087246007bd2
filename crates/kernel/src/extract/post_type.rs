//! Post type and taxonomy extractor.

use std::collections::BTreeSet;

use super::{SignalDomain, SignalExtractor, collect};
use crate::plugin::PluginId;
use crate::request::RequestContext;
use crate::rules::{TokenTable, lookup};

/// Static lookup from the content entity's type and taxonomies.
#[derive(Debug, Clone)]
pub struct PostTypeExtractor {
    post_types: TokenTable,
    taxonomies: TokenTable,
}

impl PostTypeExtractor {
    pub fn new(post_types: TokenTable, taxonomies: TokenTable) -> Self {
        Self {
            post_types,
            taxonomies,
        }
    }
}

impl SignalExtractor for PostTypeExtractor {
    fn name(&self) -> &'static str {
        "post_type"
    }

    fn domain(&self) -> SignalDomain {
        SignalDomain::Content
    }

    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId> {
        let mut out = BTreeSet::new();
        let Some(content) = &ctx.content else {
            return out;
        };

        collect(&mut out, lookup(&self.post_types, &content.post_type));
        for taxonomy in &content.taxonomies {
            collect(&mut out, lookup(&self.taxonomies, taxonomy));
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::request::ContentEntity;

    #[test]
    fn maps_type_and_taxonomies() {
        let mut post_types = TokenTable::new();
        post_types.insert("product".into(), vec![PluginId::new("woocommerce")]);
        let mut taxonomies = TokenTable::new();
        taxonomies.insert("tribe_events_cat".into(), vec![PluginId::new("the-events-calendar")]);
        let extractor = PostTypeExtractor::new(post_types, taxonomies);

        let ctx = RequestContext::new("/x/").with_content(ContentEntity {
            id: "1".into(),
            post_type: "product".into(),
            taxonomies: vec!["tribe_events_cat".into(), "category".into()],
            ..ContentEntity::default()
        });

        assert_eq!(
            extractor.extract(&ctx),
            BTreeSet::from([PluginId::new("the-events-calendar"), PluginId::new("woocommerce")])
        );
    }

    #[test]
    fn no_content_is_empty() {
        let extractor = PostTypeExtractor::new(TokenTable::new(), TokenTable::new());
        assert!(extractor.extract(&RequestContext::new("/")).is_empty());
    }
}
