//! Parser for the metadata header at the top of a plugin's main file.
//!
//! Headers are `Key: value` lines inside the file's leading comment block:
//!
//! ```text
//! /**
//!  * Plugin Name: JetMenu
//!  * Version: 2.4.1
//!  * Requires Plugins: jet-engine, elementor
//!  */
//! ```
//!
//! Only the first [`HEADER_SCAN_BYTES`] of the file are considered.

use super::PluginId;

/// Bytes of the main file scanned for header fields.
pub const HEADER_SCAN_BYTES: usize = 8 * 1024;

/// Metadata parsed from a plugin header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginHeader {
    /// Human-readable name (`Plugin Name`).
    pub name: Option<String>,

    /// Declared version (`Version`).
    pub version: Option<String>,

    /// Plugins this one explicitly requires (`Requires Plugins`).
    pub requires: Vec<PluginId>,
}

impl PluginHeader {
    /// Parse header fields out of raw file text.
    ///
    /// Unknown keys and malformed lines are ignored; a file with no header
    /// yields `PluginHeader::default()`.
    pub fn parse_str(content: &str) -> Self {
        let mut header = Self::default();

        for line in truncate_to_boundary(content, HEADER_SCAN_BYTES).lines() {
            let line = line
                .trim()
                .trim_start_matches("/*")
                .trim_start_matches("//")
                .trim_start_matches(['*', '#'])
                .trim();

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().trim_end_matches("*/").trim();
            if value.is_empty() {
                continue;
            }

            match key.trim().to_ascii_lowercase().as_str() {
                "plugin name" => header.name = Some(value.to_string()),
                "version" => header.version = Some(value.to_string()),
                "requires plugins" => {
                    header.requires = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PluginId::from_path)
                        .collect();
                }
                _ => {}
            }
        }

        header
    }
}

/// Longest prefix of `text` no longer than `max` bytes ending on a char boundary.
pub(crate) fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_header() {
        let src = r#"<?php
/**
 * Plugin Name: JetMenu
 * Version: 2.4.1
 * Requires Plugins: jet-engine, elementor
 */
"#;
        let header = PluginHeader::parse_str(src);
        assert_eq!(header.name.as_deref(), Some("JetMenu"));
        assert_eq!(header.version.as_deref(), Some("2.4.1"));
        assert_eq!(
            header.requires,
            vec![PluginId::new("jet-engine"), PluginId::new("elementor")]
        );
    }

    #[test]
    fn parse_without_requires() {
        let header = PluginHeader::parse_str("<?php\n/* Plugin Name: Minimal */\n");
        assert_eq!(header.name.as_deref(), Some("Minimal"));
        assert!(header.requires.is_empty());
    }

    #[test]
    fn keys_are_case_insensitive() {
        let header = PluginHeader::parse_str(" * REQUIRES PLUGINS: woocommerce\n");
        assert_eq!(header.requires, vec![PluginId::new("woocommerce")]);
    }

    #[test]
    fn empty_input_is_default() {
        assert_eq!(PluginHeader::parse_str(""), PluginHeader::default());
    }

    #[test]
    fn fields_beyond_scan_window_are_ignored() {
        let mut src = "x".repeat(HEADER_SCAN_BYTES);
        src.push_str("\nRequires Plugins: late\n");
        assert!(PluginHeader::parse_str(&src).requires.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ééé";
        assert_eq!(truncate_to_boundary(text, 3), "é");
    }
}
