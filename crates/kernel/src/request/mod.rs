//! Per-request snapshot handed to the engine.
//!
//! A [`RequestContext`] is built fresh for each host request and dropped
//! when the request ends. Extractors only ever read it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which part of the host bootstrap the filter runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the host has resolved the request to a content entity.
    /// Only URL, query and role signals are available.
    Early,
    /// The matched content entity is known.
    #[default]
    Full,
}

/// User context for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Whether the user is logged in.
    #[serde(default)]
    pub authenticated: bool,
    /// Role names held by the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserContext {
    /// Create context for anonymous user.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Create context for a logged-in user with roles.
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authenticated: true,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the user holds any role at all.
    pub fn has_any_role(&self) -> bool {
        self.roles.iter().any(|r| !r.is_empty())
    }
}

/// The content entity a request resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntity {
    /// Stable content identifier; keys the content cache domain.
    pub id: String,
    /// Content type name (`post`, `page`, `product`, ...).
    #[serde(default)]
    pub post_type: String,
    /// Taxonomies the entity is attached to.
    #[serde(default)]
    pub taxonomies: Vec<String>,
    /// Raw stored body markup.
    #[serde(default)]
    pub body: String,
    /// Serialized page-builder element tree, if the entity has one.
    #[serde(default)]
    pub builder_data: Option<String>,
}

/// Read-only snapshot of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Request URI as received; may include a query string.
    pub uri: String,
    /// Decoded query parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Matched content entity, when known.
    #[serde(default)]
    pub content: Option<ContentEntity>,
    #[serde(default)]
    pub user: UserContext,
    #[serde(default)]
    pub phase: Phase,
}

impl RequestContext {
    /// Create a context for a URI, parsing any query string it carries.
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let query = parse_query(&uri);
        Self {
            uri,
            query,
            ..Self::default()
        }
    }

    /// Attach the matched content entity.
    pub fn with_content(mut self, content: ContentEntity) -> Self {
        self.content = Some(content);
        self
    }

    /// Attach the current user.
    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = user;
        self
    }

    /// Set the bootstrap phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Merge parameters from the URI's query string into `query`.
    ///
    /// Explicitly supplied parameters win over ones parsed from the URI.
    pub fn with_uri_query(mut self) -> Self {
        for (key, value) in parse_query(&self.uri) {
            self.query.entry(key).or_insert(value);
        }
        self
    }

    /// Normalized request path; see [`normalize_path`].
    pub fn normalized_path(&self) -> String {
        normalize_path(&self.uri)
    }

    /// Whether a query parameter is present.
    pub fn has_query(&self, name: &str) -> bool {
        self.query.contains_key(name)
    }
}

/// Normalize a request URI into the path form every URL rule matches against.
///
/// Strips query string and fragment, percent-decodes, lowercases, collapses
/// repeated slashes and guarantees a leading and trailing `/`.
pub fn normalize_path(uri: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let mut out = String::with_capacity(decoded.len() + 2);
    out.push('/');
    for segment in decoded.split('/').filter(|s| !s.is_empty()) {
        out.push_str(&segment.to_lowercase());
        out.push('/');
    }
    out
}

fn parse_query(uri: &str) -> BTreeMap<String, String> {
    let Some((_, query)) = uri.split_once('?') else {
        return BTreeMap::new();
    };
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|d| d.into_owned())
        .unwrap_or(spaced)
}
