//! Built-in detection and dependency tables.
//!
//! Hand-maintained; covers the plugins most often seen on production sites.
//! Sites with custom plugins extend these through a rules file.

use super::{HubRule, MarkerRule, RuleSet, TokenTable, UrlRule};
use crate::plugin::PluginId;

fn ids(list: &[&str]) -> Vec<PluginId> {
    list.iter().map(|s| PluginId::new(*s)).collect()
}

fn table(rows: &[(&str, &[&str])]) -> TokenTable {
    rows.iter()
        .map(|(key, plugins)| ((*key).to_string(), ids(plugins)))
        .collect()
}

const WOO: &[&str] = &["woocommerce"];
const ELEMENTOR: &[&str] = &["elementor"];
const ELEMENTOR_PRO: &[&str] = &["elementor", "elementor-pro"];
const CF7: &[&str] = &["contact-form-7"];
const BBPRESS: &[&str] = &["bbpress"];
const BUDDYPRESS: &[&str] = &["buddypress"];
const LEARNDASH: &[&str] = &["sfwd-lms"];
const EVENTS: &[&str] = &["the-events-calendar"];
const EDD: &[&str] = &["easy-digital-downloads"];

pub(super) fn rules() -> RuleSet {
    RuleSet {
        replace_builtin: false,
        essential: Vec::new(),
        logged_in_always: ids(&["wp-statistics"]),
        url: url_rules(),
        query: table(&[
            ("add-to-cart", WOO),
            ("wc-ajax", WOO),
            ("edd_action", EDD),
            ("tribe-bar-date", EVENTS),
            ("elementor-preview", ELEMENTOR),
        ]),
        shortcodes: table(&[
            ("contact-form-7", CF7),
            ("contact-form", CF7),
            ("wpforms", &["wpforms-lite"]),
            ("gravityform", &["gravityforms"]),
            ("gravityforms", &["gravityforms"]),
            ("products", WOO),
            ("product_page", WOO),
            ("add_to_cart", WOO),
            ("woocommerce_cart", WOO),
            ("woocommerce_checkout", WOO),
            ("woocommerce_my_account", WOO),
            ("bbp-forum-index", BBPRESS),
            ("bbp-single-forum", BBPRESS),
            ("ld_course_list", LEARNDASH),
            ("course_content", LEARNDASH),
            ("tribe_events", EVENTS),
            ("downloads", EDD),
            ("purchase_link", EDD),
            ("mc4wp_form", &["mailchimp-for-wp"]),
            ("elementor-template", ELEMENTOR),
            ("jet_engine", &["jet-engine"]),
        ]),
        blocks: table(&[
            ("woocommerce", WOO),
            ("contact-form-7", CF7),
            ("wpforms", &["wpforms-lite"]),
            ("gravityforms", &["gravityforms"]),
            ("jet-engine", &["jet-engine"]),
            ("learndash", LEARNDASH),
            ("tribe", EVENTS),
            ("edd", EDD),
            ("yoast", &["wordpress-seo"]),
            ("yoast-seo", &["wordpress-seo"]),
            ("bbpress", BBPRESS),
        ]),
        widgets: table(&[
            ("form", ELEMENTOR_PRO),
            ("posts", ELEMENTOR_PRO),
            ("nav-menu", ELEMENTOR_PRO),
            ("slides", ELEMENTOR_PRO),
            ("woocommerce-*", &["elementor-pro", "woocommerce"]),
            ("wc-*", &["elementor-pro", "woocommerce"]),
            ("jet-menu*", &["jet-menu"]),
            ("jet-smart-filters-*", &["jet-smart-filters"]),
            ("jet-listing-*", &["jet-engine"]),
            ("jet-*", &["jet-elements"]),
            ("wpforms", &["wpforms-lite"]),
        ]),
        post_types: table(&[
            ("product", WOO),
            ("shop_order", WOO),
            ("forum", BBPRESS),
            ("topic", BBPRESS),
            ("reply", BBPRESS),
            ("sfwd-courses", LEARNDASH),
            ("sfwd-lessons", LEARNDASH),
            ("sfwd-topic", LEARNDASH),
            ("sfwd-quiz", LEARNDASH),
            ("tribe_events", EVENTS),
            ("download", EDD),
            ("elementor_library", ELEMENTOR),
        ]),
        taxonomies: table(&[
            ("product_cat", WOO),
            ("product_tag", WOO),
            ("tribe_events_cat", EVENTS),
            ("download_category", EDD),
            ("ld_course_category", LEARNDASH),
        ]),
        roles: table(&[
            ("customer", WOO),
            ("shop_manager", WOO),
            ("bbp_participant", BBPRESS),
            ("bbp_moderator", BBPRESS),
            ("group_leader", LEARNDASH),
        ]),
        dependencies: table(&[
            ("elementor-pro", ELEMENTOR),
            ("jet-engine", ELEMENTOR),
            ("jet-elements", ELEMENTOR),
            ("jet-menu", &["jet-engine", "elementor"]),
            ("jet-smart-filters", &["jet-engine"]),
            ("woocommerce-subscriptions", WOO),
            ("woocommerce-payments", WOO),
            ("woocommerce-gateway-stripe", WOO),
            ("woocommerce-memberships", WOO),
            ("buddypress-docs", BUDDYPRESS),
            ("bbpress-notify", BBPRESS),
            ("learndash-woocommerce", &["sfwd-lms", "woocommerce"]),
            ("events-calendar-pro", EVENTS),
            ("event-tickets", EVENTS),
            ("edd-recurring", EDD),
        ]),
        markers: vec![
            marker("class_exists( 'WooCommerce' )", "woocommerce"),
            marker("WC_VERSION", "woocommerce"),
            marker("woocommerce_loaded", "woocommerce"),
            marker("ELEMENTOR_VERSION", "elementor"),
            marker("elementor/loaded", "elementor"),
            marker("ELEMENTOR_PRO_VERSION", "elementor-pro"),
            marker("Jet_Engine", "jet-engine"),
            marker("jet-engine/init", "jet-engine"),
            marker("bbp_get_version", "bbpress"),
            marker("BuddyPress", "buddypress"),
            marker("LEARNDASH_VERSION", "sfwd-lms"),
            marker("Tribe__Events__Main", "the-events-calendar"),
            marker("EDD_VERSION", "easy-digital-downloads"),
            marker("GFForms", "gravityforms"),
        ],
        hubs: vec![
            hub("jet-", "jet-engine"),
            hub("elementor-", "elementor"),
            hub("woocommerce-", "woocommerce"),
            hub("edd-", "easy-digital-downloads"),
        ],
    }
}

fn url_rules() -> Vec<UrlRule> {
    let rule = |pattern: &str, plugins: &[&str]| UrlRule {
        pattern: pattern.to_string(),
        plugins: ids(plugins),
    };

    vec![
        rule("/shop/", WOO),
        rule("/cart/", WOO),
        rule("/checkout/", WOO),
        rule("/my-account/", WOO),
        rule("re:^/product(-category|-tag)?/", WOO),
        rule("/forums/", BBPRESS),
        rule("re:^/(members|groups|activity)/", BUDDYPRESS),
        rule("re:^/(courses|lessons|topic|quizzes)/", LEARNDASH),
        rule("/events/", EVENTS),
        rule("re:^/downloads?/", EDD),
        rule("/contact/", CF7),
        rule("re:^/(sitemap_index|[a-z_-]+-sitemap\\d*)\\.xml/$", &["wordpress-seo"]),
    ]
}

fn marker(marker: &str, plugin: &str) -> MarkerRule {
    MarkerRule {
        marker: marker.to_string(),
        plugin: PluginId::new(plugin),
    }
}

fn hub(prefix: &str, hub: &str) -> HubRule {
    HubRule {
        prefix: prefix.to_string(),
        hub: PluginId::new(hub),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn url_regexes_compile() {
        for rule in url_rules() {
            if let Some(re) = rule.pattern.strip_prefix(super::super::REGEX_PREFIX) {
                assert!(regex::Regex::new(re).is_ok(), "bad builtin regex: {re}");
            }
        }
    }

    #[test]
    fn hubs_have_unique_prefixes() {
        let mut seen = HashSet::new();
        for hub in rules().hubs {
            assert!(seen.insert(hub.prefix.clone()), "duplicate hub '{}'", hub.prefix);
        }
    }

    #[test]
    fn jet_menu_requires_jet_engine() {
        let rules = rules();
        let deps = super::super::lookup(&rules.dependencies, "jet-menu");
        assert!(deps.contains(&PluginId::new("jet-engine")));
    }
}
