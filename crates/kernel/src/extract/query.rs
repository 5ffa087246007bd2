//! Query parameter extractor.

use std::collections::BTreeSet;

use super::{SignalDomain, SignalExtractor, collect};
use crate::plugin::PluginId;
use crate::request::RequestContext;
use crate::rules::{TokenTable, lookup};

/// Maps present query parameter names to plugins.
#[derive(Debug, Clone)]
pub struct QueryExtractor {
    params: TokenTable,
}

impl QueryExtractor {
    pub fn new(params: TokenTable) -> Self {
        Self { params }
    }
}

impl SignalExtractor for QueryExtractor {
    fn name(&self) -> &'static str {
        "query"
    }

    fn domain(&self) -> SignalDomain {
        SignalDomain::Live
    }

    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId> {
        let mut out = BTreeSet::new();
        for name in ctx.query.keys() {
            collect(&mut out, lookup(&self.params, name));
        }
        out
    }
}
