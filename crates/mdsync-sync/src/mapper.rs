//! Mapping from source files to stored posts.
//!
//! Everything here is pure: the same relative path and content always produce the
//! same post. The `(collection, url)` key depends on the path alone, so a deleted
//! file's key can be recomputed without its content.
//!
//! Examples (default namespace `content`, root collection `root`):
//! - `guide/index.md` -> `content/guide`, url `content-guide-index`, index
//! - `guide/setup.md` -> `content/guide`, url `setup`
//! - `guide/Deep Dive/Part 1.md` -> `content/guide`, url `deep-dive-part-1`
//! - `about.md` -> `content/root`, url `about`

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use mdsync_config::SyncConfig;
use mdsync_store::Post;

static H1_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t#]*$").unwrap());

/// Store key of a source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentKey {
    /// Namespaced collection name.
    pub collection: String,
    /// Slug within the collection.
    pub url: String,
    /// Whether the file is the collection's landing page.
    pub is_index: bool,
}

#[derive(Deserialize)]
struct FrontMatter {
    title: Option<String>,
}

/// Split a leading `---` front-matter block from the body.
///
/// Returns the raw YAML and the trimmed remainder, or `None` when the content has no
/// closed front-matter block.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body.trim()));
        }
        offset += line.len();
    }
    None
}

/// Title from a front-matter `title:` field.
fn front_matter_title(yaml: &str) -> Option<String> {
    let trimmed = yaml.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_yaml::from_str::<FrontMatter>(trimmed) {
        Ok(fields) => fields
            .title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty()),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparsable front matter");
            None
        }
    }
}

/// Text of the first level-1 heading.
fn first_heading(body: &str) -> Option<String> {
    H1_PATTERN
        .captures(body)
        .map(|caps| caps[1].trim().to_owned())
        .filter(|t| !t.is_empty())
}

/// Lower-case `path`, turn separators and spaces into `-`, collapse repeats.
///
/// Stored urls are built with this, so links that name a source path can be
/// resolved to the same url.
#[must_use]
pub fn slugify(path: &str) -> String {
    let mut slug = String::with_capacity(path.len());
    for ch in path.chars().flat_map(char::to_lowercase) {
        let ch = if matches!(ch, '/' | '\\' | ' ') { '-' } else { ch };
        if ch == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(ch);
    }
    slug.trim_matches('-').to_owned()
}

/// Normal path components as strings.
fn components(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Derives collection, url, title and index flag from source files.
#[derive(Debug, Clone)]
pub struct PathMapper {
    namespace: String,
    root_collection: String,
    extensions: Vec<String>,
}

impl PathMapper {
    /// Create a mapper.
    ///
    /// `extensions` are matched case-insensitively and without the leading dot.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        root_collection: impl Into<String>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            root_collection: root_collection.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Mapper using the configured namespace, root collection and extensions.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.namespace.clone(),
            config.root_collection.clone(),
            config.extensions.clone(),
        )
    }

    /// Namespace prefix shared by every sync-sourced collection.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether a file name has an eligible extension.
    #[must_use]
    pub fn is_eligible(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    /// Namespaced collection of a first-level directory.
    #[must_use]
    pub fn collection_for_dir(&self, dir: &str) -> String {
        format!("{}/{dir}", self.namespace)
    }

    /// Namespaced collection of files directly under the root.
    #[must_use]
    pub fn root_collection(&self) -> String {
        self.collection_for_dir(&self.root_collection)
    }

    /// Name of the root collection without the namespace.
    #[must_use]
    pub fn root_collection_name(&self) -> &str {
        &self.root_collection
    }

    /// Whether `collection` carries this mapper's namespace.
    #[must_use]
    pub fn is_namespaced(&self, collection: &str) -> bool {
        collection
            .strip_prefix(self.namespace.as_str())
            .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
    }

    /// First-level directory of a path relative to the sync root.
    ///
    /// `None` for files directly under the root.
    #[must_use]
    pub fn base_dir(rel: &Path) -> Option<String> {
        let parts = components(rel);
        (parts.len() > 1).then(|| parts[0].clone())
    }

    /// Whether a file name designates its collection's landing page.
    #[must_use]
    pub fn is_index_name(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        let Some((stem, ext)) = lower.rsplit_once('.') else {
            return false;
        };
        (stem == "index" || stem == "readme") && self.extensions.iter().any(|x| x == ext)
    }

    /// Store key for a path relative to the sync root.
    #[must_use]
    pub fn key(&self, rel: &Path) -> DocumentKey {
        let parts = components(rel);
        let (collection, inner) = match parts.split_first() {
            Some((dir, rest)) if !rest.is_empty() => (self.collection_for_dir(dir), rest),
            _ => (self.root_collection(), parts.as_slice()),
        };

        let file_name = inner.last().map(String::as_str).unwrap_or_default();
        let is_index = self.is_index_name(file_name);

        let url = if is_index {
            format!("{}-index", collection.replace('/', "-"))
        } else {
            let joined = inner.join("/");
            let without_ext = Path::new(&joined).with_extension("");
            slugify(&without_ext.to_string_lossy())
        };

        DocumentKey {
            collection,
            url,
            is_index,
        }
    }

    /// Build the post for a file from its relative path and raw content.
    ///
    /// Title precedence: front-matter `title`, first `# ` heading, file stem.
    #[must_use]
    pub fn document(&self, rel: &Path, content: &str) -> Post {
        let key = self.key(rel);

        let (fm_title, body) = match split_front_matter(content) {
            Some((yaml, body)) => (front_matter_title(yaml), body),
            None => (None, content),
        };

        let title = fm_title
            .or_else(|| first_heading(body))
            .unwrap_or_else(|| {
                rel.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        Post {
            title,
            body: body.to_owned(),
            url: key.url,
            collection: key.collection,
            is_index: key.is_index,
        }
    }
}

impl Default for PathMapper {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapper() -> PathMapper {
        PathMapper::default()
    }

    #[test]
    fn test_key_index_file() {
        let key = mapper().key(Path::new("A/index.md"));
        assert_eq!(
            key,
            DocumentKey {
                collection: "content/A".to_owned(),
                url: "content-A-index".to_owned(),
                is_index: true,
            }
        );
    }

    #[test]
    fn test_key_plain_file() {
        let key = mapper().key(Path::new("A/notes.md"));
        assert_eq!(key.collection, "content/A");
        assert_eq!(key.url, "notes");
        assert!(!key.is_index);
    }

    #[test]
    fn test_key_nested_with_spaces() {
        let key = mapper().key(Path::new("A/Sub Dir/My  File.md"));
        assert_eq!(key.collection, "content/A");
        assert_eq!(key.url, "sub-dir-my-file");
    }

    #[test]
    fn test_key_root_file() {
        let key = mapper().key(Path::new("Top.md"));
        assert_eq!(key.collection, "content/root");
        assert_eq!(key.url, "top");
    }

    #[test]
    fn test_key_root_readme_is_index() {
        let key = mapper().key(Path::new("README.md"));
        assert_eq!(key.collection, "content/root");
        assert_eq!(key.url, "content-root-index");
        assert!(key.is_index);
    }

    #[test]
    fn test_readme_case_insensitive() {
        assert!(mapper().key(Path::new("guide/ReadMe.MD")).is_index);
        assert!(!mapper().key(Path::new("guide/readme.txt")).is_index);
        assert!(!mapper().key(Path::new("guide/index-old.md")).is_index);
    }

    #[test]
    fn test_nested_index_uses_collection_index_url() {
        let key = mapper().key(Path::new("guide/deep/index.md"));
        assert_eq!(key.url, "content-guide-index");
    }

    #[test]
    fn test_key_is_deterministic() {
        let m = mapper();
        let path = Path::new("guide/Setup Guide.md");
        assert_eq!(m.key(path), m.key(path));
    }

    #[test]
    fn test_custom_namespace() {
        let m = PathMapper::new("docs", "home", vec![".MD".to_owned()]);
        assert_eq!(m.key(Path::new("x.md")).collection, "docs/home");
        assert_eq!(m.key(Path::new("a/x.md")).collection, "docs/a");
        assert!(m.is_eligible(Path::new("a/x.Md")));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("A/B C/--D"), "a-b-c-d");
        assert_eq!(slugify(" lead"), "lead");
        assert_eq!(slugify("already-slug"), "already-slug");
    }

    #[test]
    fn test_title_from_front_matter() {
        let content = "---\ntitle: \"Quoted Title\"\ntags: [a]\n---\n\n# Heading\n\nBody";
        let post = mapper().document(Path::new("A/page.md"), content);
        assert_eq!(post.title, "Quoted Title");
        assert_eq!(post.body, "# Heading\n\nBody");
    }

    #[test]
    fn test_title_from_heading() {
        let post = mapper().document(Path::new("A/index.md"), "# Welcome\n\nHello");
        assert_eq!(post.title, "Welcome");
        assert_eq!(post.body, "# Welcome\n\nHello");
        assert!(post.is_index);
    }

    #[test]
    fn test_title_from_filename() {
        let post = mapper().document(Path::new("A/Release Notes.md"), "No heading here");
        assert_eq!(post.title, "Release Notes");
        assert_eq!(post.url, "release-notes");
    }

    #[test]
    fn test_front_matter_without_title_falls_back_to_heading() {
        let content = "---\nauthor: someone\n---\n## Sub\n# Main";
        let post = mapper().document(Path::new("A/x.md"), content);
        assert_eq!(post.title, "Main");
        assert_eq!(post.body, "## Sub\n# Main");
    }

    #[test]
    fn test_unclosed_front_matter_is_body() {
        let content = "---\ntitle: Never closed\n# Heading";
        let post = mapper().document(Path::new("A/x.md"), content);
        assert_eq!(post.title, "Heading");
        assert_eq!(post.body, content);
    }

    #[test]
    fn test_heading_trailing_hashes_removed() {
        assert_eq!(first_heading("# Title ##"), Some("Title".to_owned()));
        assert_eq!(first_heading("#NoSpace"), None);
    }

    #[test]
    fn test_is_namespaced() {
        let m = mapper();
        assert!(m.is_namespaced("content/A"));
        assert!(!m.is_namespaced("content"));
        assert!(!m.is_namespaced("content/"));
        assert!(!m.is_namespaced("contentx/A"));
        assert!(!m.is_namespaced("uploads/A"));
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(PathMapper::base_dir(Path::new("A/x.md")), Some("A".to_owned()));
        assert_eq!(PathMapper::base_dir(Path::new("x.md")), None);
    }
}
