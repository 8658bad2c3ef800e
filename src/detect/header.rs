// Plugin header parsing
//
// A plugin announces itself with a comment block near the top of its main
// PHP file:
//
//   <?php
//   /*
//    * Plugin Name: Hello Dolly
//    * Version: 1.7.2
//    * Description: Lyrics in your admin.
//    */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Only this many leading bytes are searched for the header block
pub const HEADER_WINDOW_BYTES: usize = 8192;

/// Longest accepted `Plugin Name`
pub const MAX_PLUGIN_NAME_CHARS: usize = 100;

const SCRIPT_OPEN_TAG: &str = "<?php";

static NAME_RE: Lazy<Regex> = Lazy::new(|| field_regex("Plugin Name"));
static VERSION_RE: Lazy<Regex> = Lazy::new(|| field_regex("Version"));
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| field_regex("Description"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

fn field_regex(field: &str) -> Regex {
    Regex::new(&format!(r"(?im)^[ \t/*#@]*{}:(.*)$", regex::escape(field))).expect("Invalid regex")
}

/// Fields read from a plugin header block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHeader {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Whether a file name carries a PHP extension
pub fn has_script_extension(name: &str) -> bool {
    name.len() > 4 && name.to_ascii_lowercase().ends_with(".php")
}

/// Whether the content opens with `<?php`, ignoring a BOM and leading whitespace
pub fn starts_with_script_tag(content: &str) -> bool {
    let body = content.strip_prefix('\u{feff}').unwrap_or(content).trim_start();
    body.get(..SCRIPT_OPEN_TAG.len())
        .is_some_and(|open| open.eq_ignore_ascii_case(SCRIPT_OPEN_TAG))
}

/// Parse a plugin header from file contents
///
/// Returns `None` unless the file opens with the script tag and a
/// `/* ... */` block inside the first 8 KiB carries a non-empty
/// `Plugin Name` of at most 100 characters.
pub fn parse_plugin_header(content: &str) -> Option<PluginHeader> {
    if !starts_with_script_tag(content) {
        return None;
    }
    let body = content.strip_prefix('\u{feff}').unwrap_or(content);
    let window = truncate_to_boundary(body, HEADER_WINDOW_BYTES);

    comment_blocks(window).find_map(parse_block)
}

fn parse_block(block: &str) -> Option<PluginHeader> {
    let name = capture_field(&NAME_RE, block)?;
    if name.chars().count() > MAX_PLUGIN_NAME_CHARS {
        return None;
    }

    Some(PluginHeader {
        name,
        version: capture_field(&VERSION_RE, block),
        description: capture_field(&DESCRIPTION_RE, block),
    })
}

fn capture_field(re: &Regex, block: &str) -> Option<String> {
    let raw = re.captures(block)?.get(1)?.as_str();
    let raw = raw.trim_end().trim_end_matches("*/");
    let value = clean_field(raw);
    (!value.is_empty()).then_some(value)
}

/// Strip markup and collapse whitespace
fn clean_field(raw: &str) -> String {
    TAG_RE
        .replace_all(raw, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Closed `/* ... */` blocks in order of appearance
fn comment_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let start = rest.find("/*")?;
        let after = &rest[start + 2..];
        let end = after.find("*/")?;
        let block = &after[..end];
        rest = &after[end + 2..];
        Some(block)
    })
}

fn truncate_to_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
