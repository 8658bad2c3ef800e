// Organization page parsing
//
// Structured rows (`Box-row` elements) are preferred since they carry the
// description, language and update time. When the markup is not recognized,
// bare repository links are collected instead.

use super::Repository;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static ROW_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<(?:li|div|article)\b[^>]*\bclass\s*=\s*["'][^"']*\bBox-row\b[^"']*["'][^>]*>"#)
        .expect("Invalid regex")
});
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(p|span|div)\b[^>]*class\s*=\s*["'][^"']*description[^"']*["'][^>]*>(.*?)</(?:p|span|div)>"#)
        .expect("Invalid regex")
});
static LANGUAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<[a-z]+\b[^>]*(?:itemprop\s*=\s*["']programmingLanguage["']|data-testid\s*=\s*["']repository-language["']|class\s*=\s*["'][^"']*language[^"']*["'])[^>]*>([^<]*)<"#,
    )
    .expect("Invalid regex")
});
static DATETIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bdatetime\s*=\s*["']([^"']+)["']"#).expect("Invalid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid regex"));

/// Names that are organization pages rather than repositories
const RESERVED_NAMES: [&str; 3] = ["settings", "security", "insights"];

fn link_regex(org: &str, anchor: bool) -> Option<Regex> {
    let org = regex::escape(org);
    let pattern = if anchor {
        format!(r#"(?i)<a\b[^>]+href\s*=\s*["']/{org}/([^/"'?#]+)["'][^>]*>[^<]+</a>"#)
    } else {
        format!(r#"(?i)href\s*=\s*["']/{org}/([^/"'?#]+)["'/?#]"#)
    };
    Regex::new(&pattern).ok()
}

fn text_content(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    decode_entities(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

fn is_repository_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !RESERVED_NAMES.iter().any(|r| name.eq_ignore_ascii_case(r))
}

fn repository_url(web_base: &str, org: &str, name: &str) -> String {
    format!("{}/{}/{}", web_base.trim_end_matches('/'), org, name)
}

/// Parse `Box-row` elements into repositories with metadata
pub fn parse_structured(html: &str, org: &str, web_base: &str) -> Vec<Repository> {
    let Some(link_re) = link_regex(org, false) else {
        return Vec::new();
    };

    let starts: Vec<usize> = ROW_START_RE.find_iter(html).map(|m| m.start()).collect();
    let mut repositories = Vec::new();

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let row = &html[start..end];

        let Some(name) = link_re
            .captures_iter(row)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .find(|name| is_repository_name(name))
        else {
            continue;
        };

        let description = DESCRIPTION_RE
            .captures(row)
            .and_then(|c| c.get(2))
            .map(|m| text_content(m.as_str()))
            .unwrap_or_default();
        let language = LANGUAGE_RE
            .captures(row)
            .and_then(|c| c.get(1))
            .map(|m| text_content(m.as_str()))
            .unwrap_or_default();
        let updated_at = DATETIME_RE
            .captures(row)
            .and_then(|c| c.get(1))
            .and_then(|m| DateTime::parse_from_rfc3339(m.as_str()).ok())
            .map(|dt| dt.with_timezone(&Utc));

        repositories.push(Repository {
            url: repository_url(web_base, org, &name),
            name,
            description,
            language,
            updated_at,
        });
    }

    repositories
}

/// Collect `<a href="/{org}/{name}">` links as bare repositories
pub fn parse_links(html: &str, org: &str, web_base: &str) -> Vec<Repository> {
    let Some(anchor_re) = link_regex(org, true) else {
        return Vec::new();
    };

    anchor_re
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|name| is_repository_name(name))
        .map(|name| Repository {
            url: repository_url(web_base, org, &name),
            name,
            description: String::new(),
            language: String::new(),
            updated_at: None,
        })
        .collect()
}

/// Structured parse with link fallback; empty means nothing was recognized
pub fn parse_organization_page(html: &str, org: &str, web_base: &str) -> Vec<Repository> {
    let structured = parse_structured(html, org, web_base);
    if !structured.is_empty() {
        return structured;
    }

    tracing::debug!(org, "No structured repository rows, falling back to link scan");
    parse_links(html, org, web_base)
}
