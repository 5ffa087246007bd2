//! User role extractor.

use std::collections::BTreeSet;

use super::{SignalDomain, SignalExtractor, collect};
use crate::plugin::PluginId;
use crate::request::RequestContext;
use crate::rules::{TokenTable, lookup};

/// Static lookup from the user's roles.
///
/// Holding any role also pulls in the `always` identifiers, independent of
/// which role it is.
#[derive(Debug, Clone)]
pub struct RoleExtractor {
    roles: TokenTable,
    always: Vec<PluginId>,
}

impl RoleExtractor {
    pub fn new(roles: TokenTable, always: Vec<PluginId>) -> Self {
        Self { roles, always }
    }
}

impl SignalExtractor for RoleExtractor {
    fn name(&self) -> &'static str {
        "role"
    }

    fn domain(&self) -> SignalDomain {
        SignalDomain::Live
    }

    fn extract(&self, ctx: &RequestContext) -> BTreeSet<PluginId> {
        let mut out = BTreeSet::new();
        if !ctx.user.has_any_role() {
            return out;
        }

        collect(&mut out, &self.always);
        for role in &ctx.user.roles {
            collect(&mut out, lookup(&self.roles, role));
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::request::UserContext;

    fn extractor() -> RoleExtractor {
        let mut roles = TokenTable::new();
        roles.insert("customer".into(), vec![PluginId::new("woocommerce")]);
        RoleExtractor::new(roles, vec![PluginId::new("wp-statistics")])
    }

    #[test]
    fn any_role_adds_always_on() {
        let ctx = RequestContext::new("/").with_user(UserContext::with_roles(["editor"]));
        assert_eq!(extractor().extract(&ctx), BTreeSet::from([PluginId::new("wp-statistics")]));
    }

    #[test]
    fn mapped_role_adds_plugins() {
        let ctx = RequestContext::new("/").with_user(UserContext::with_roles(["customer"]));
        assert_eq!(
            extractor().extract(&ctx),
            BTreeSet::from([PluginId::new("woocommerce"), PluginId::new("wp-statistics")])
        );
    }

    #[test]
    fn anonymous_is_empty() {
        assert!(extractor().extract(&RequestContext::new("/")).is_empty());
    }
}
