//! Markdown to HTML rendering for served pages.

use std::fmt::Write;
use std::sync::LazyLock;

use md5::{Digest, Md5};
use mdsync_sync::slugify;
use pulldown_cmark::{Options, Parser, html};
use regex::{Captures, Regex};

/// Relative links to sibling markdown files: `](./guide.md)` or `](guide.md)`.
static MD_LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\((?:\./)?([^)\s:/][^)\n:]*?)\.md\)").unwrap());

/// Rewrite relative markdown links to `/post/{slug}`.
pub(crate) fn rewrite_cross_references(body: &str) -> String {
    MD_LINK_PATTERN
        .replace_all(body, |caps: &Captures<'_>| {
            format!("](/post/{})", slugify(&caps[1]))
        })
        .into_owned()
}

/// Render markdown to an HTML fragment.
pub(crate) fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Render a document body: cross-references first, then markdown.
pub(crate) fn render_body(body: &str) -> String {
    markdown_to_html(&rewrite_cross_references(body))
}

/// Markdown listing of a collection without an index document.
pub(crate) fn collection_listing<'a>(
    collection: &str,
    posts: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut out = format!("# {collection}\n\n");
    for (title, url) in posts {
        let _ = writeln!(out, "- [{title}](/post/{url})");
    }
    out
}

/// Escape text for HTML element content and attribute values.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Wrap an HTML fragment in the page shell with the live-reload script.
pub(crate) fn page(title: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<script src=\"/live-reload.js\" defer></script>\n</head>\n\
         <body>\n<main>\n{content}</main>\n</body>\n</html>\n",
        escape_html(title)
    )
}

/// Compute `ETag` from version and content.
///
/// Uses MD5 hash truncated to 64 bits (16 hex chars).
pub(crate) fn compute_etag(version: &str, content: &str) -> String {
    let hash = Md5::digest(format!("{version}:{content}").as_bytes());
    format!("\"{}\"", &hex::encode(hash)[..16])
}
