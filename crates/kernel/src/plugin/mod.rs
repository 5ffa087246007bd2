//! Plugin identity for Sieve.
//!
//! This module handles:
//! - Normalizing host plugin paths into identifiers
//! - The ordered active-plugin roster
//! - Parsing plugin metadata headers
//! - Reading plugin source text for dependency inference

mod header;
mod id;
mod source;

pub use header::{HEADER_SCAN_BYTES, PluginHeader};
pub(crate) use header::truncate_to_boundary;
pub use id::{ActivePlugin, ActivePluginSet, PluginId};
pub use source::{FsPluginSource, PluginSource};
