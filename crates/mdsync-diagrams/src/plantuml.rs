//! `PlantUML` diagram macro expansion.
//!
//! Rewrites two kinds of diagram references into image links served through the
//! `PlantUML` proxy:
//! - fenced ```` ```plantuml ```` code blocks
//! - `![title](path/to/file.puml)` references to diagram files on disk
//!
//! Diagram sources are encoded with `PlantUML`'s `~h` hex text encoding, so image
//! URLs are deterministic and need no compression.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::consts::{DEFAULT_PUBLIC_URL, SKINPARAM_MARKER, SKINPARAMS};
use crate::transform::{TextTransform, TransformContext, TransformError};

static FENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```plantuml\s*\n(.*?)\n```").unwrap());

static PUML_REF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+\.puml)\)").unwrap());

/// Encode diagram source with `PlantUML`'s hex text encoding.
#[must_use]
pub fn encode_text(source: &str) -> String {
    format!("~h{}", hex::encode(source.as_bytes()))
}

/// Insert the font block right after the `@startuml` line.
fn inject_skinparams(source: &str) -> String {
    let Some(pos) = source.find("@startuml") else {
        return source.to_owned();
    };
    let after = &source[pos..];
    let Some(newline) = after.find('\n') else {
        return format!("{source}\n{SKINPARAMS}");
    };
    let insert_at = pos + newline + 1;
    let mut result = String::with_capacity(source.len() + SKINPARAMS.len());
    result.push_str(&source[..insert_at]);
    result.push_str(SKINPARAMS);
    result.push_str(&source[insert_at..]);
    result
}

/// Complete inline diagram code with `@startuml`/`@enduml` markers.
///
/// The font block is only added when `@startuml` itself was missing.
fn complete_inline(code: &str) -> String {
    let mut source = String::with_capacity(code.len() + SKINPARAMS.len() + 24);
    if !code.contains("@startuml") {
        source.push_str("@startuml\n");
        source.push_str(SKINPARAMS);
    }
    source.push_str(code);
    if !code.contains("@enduml") {
        source.push_str("\n@enduml");
    }
    source
}

/// Prepare the contents of a `.puml` file.
fn prepare_file_source(content: &str) -> String {
    if content.contains(SKINPARAM_MARKER) {
        content.to_owned()
    } else if content.contains("@startuml") {
        inject_skinparams(content)
    } else {
        complete_inline(content.trim())
    }
}

/// Remove a ```` ```plantuml ```` fence wrapping a whole diagram file.
fn strip_file_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```plantuml") else {
        return content;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    let trimmed = rest.trim_end();
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim_end()
}

/// Paths tried, in order, for a diagram reference.
fn candidate_paths(reference: &str, ctx: &TransformContext) -> Vec<PathBuf> {
    let rel = Path::new(reference);
    let mut candidates = Vec::with_capacity(3);
    if let Some(base) = ctx.base_dir() {
        candidates.push(base.join(rel));
        if let Some(name) = rel.file_name() {
            candidates.push(base.join("diagrams").join(name));
        }
    }
    candidates.push(ctx.root().join(rel));
    candidates
}

/// Replace every regex match with a fallible replacement.
fn try_replace_all(
    pattern: &Regex,
    text: &str,
    mut replace: impl FnMut(&Captures<'_>) -> Result<String, TransformError>,
) -> Result<String, TransformError> {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for caps in pattern.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        result.push_str(&text[last..whole.start()]);
        result.push_str(&replace(&caps)?);
        last = whole.end();
    }
    result.push_str(&text[last..]);
    Ok(result)
}

/// Expands `PlantUML` diagrams into image links.
#[derive(Debug, Clone)]
pub struct PlantUmlTransform {
    public_url: String,
}

impl Default for PlantUmlTransform {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_URL)
    }
}

impl PlantUmlTransform {
    /// Create a transform emitting links under `public_url` (e.g. `/plantuml`).
    #[must_use]
    pub fn new(public_url: impl Into<String>) -> Self {
        let public_url: String = public_url.into();
        Self {
            public_url: public_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Image URL for a complete diagram source.
    #[must_use]
    pub fn image_url(&self, source: &str) -> String {
        format!("{}/png/{}", self.public_url, encode_text(source))
    }

    fn expand_fences(&self, body: &str) -> String {
        FENCE_PATTERN
            .replace_all(body, |caps: &Captures<'_>| {
                let source = complete_inline(caps[1].trim());
                format!("![PlantUML Diagram]({})", self.image_url(&source))
            })
            .into_owned()
    }

    fn expand_references(
        &self,
        body: &str,
        ctx: &TransformContext,
    ) -> Result<String, TransformError> {
        try_replace_all(&PUML_REF_PATTERN, body, |caps| {
            let title = &caps[1];
            let reference = &caps[2];
            match read_reference(reference, ctx)? {
                Some(content) => {
                    let source = prepare_file_source(strip_file_fence(&content));
                    Ok(format!("![{title}]({})", self.image_url(&source)))
                }
                None => {
                    tracing::debug!(reference, "Diagram file not found, linking PNG instead");
                    let stem = reference.strip_suffix(".puml").unwrap_or(reference);
                    Ok(format!("![{title}]({stem}.png)"))
                }
            }
        })
    }
}

/// Read the first existing candidate for a diagram reference.
///
/// Missing files yield `None`; files that exist but fail to read are errors.
fn read_reference(
    reference: &str,
    ctx: &TransformContext,
) -> Result<Option<String>, TransformError> {
    for path in candidate_paths(reference, ctx) {
        match std::fs::read(&path) {
            Ok(bytes) => {
                return String::from_utf8(bytes)
                    .map(Some)
                    .map_err(|_| TransformError::Encoding { path });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(TransformError::Read { path, source }),
        }
    }
    Ok(None)
}

impl TextTransform for PlantUmlTransform {
    fn transform(&self, body: &str, ctx: &TransformContext) -> Result<String, TransformError> {
        let expanded = self.expand_fences(body);
        self.expand_references(&expanded, ctx)
    }
}
