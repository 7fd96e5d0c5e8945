//! Stored document record.

use serde::{Deserialize, Serialize};

/// A document as stored and served.
///
/// Identity is the `(collection, url)` pair; writing a post with an existing key
/// replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Display name.
    pub title: String,
    /// Markdown body after transforms.
    pub body: String,
    /// Slug, unique within the collection.
    pub url: String,
    /// Grouping name (e.g. `content/guide`).
    pub collection: String,
    /// Landing page of its collection.
    pub is_index: bool,
}

impl Post {
    /// Create a non-index post.
    #[must_use]
    pub fn new(
        collection: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            url: url.into(),
            collection: collection.into(),
            is_index: false,
        }
    }

    /// Mark the post as its collection's landing page.
    #[must_use]
    pub fn into_index(mut self) -> Self {
        self.is_index = true;
        self
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No post with the key existed.
    Inserted,
    /// An existing post was replaced.
    Updated,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_post_is_not_index() {
        let post = Post::new("content/guide", "intro", "Intro", "body");

        assert_eq!(post.collection, "content/guide");
        assert_eq!(post.url, "intro");
        assert!(!post.is_index);
    }

    #[test]
    fn test_into_index() {
        let post = Post::new("content/guide", "content-guide-index", "Guide", "").into_index();
        assert!(post.is_index);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let post = Post::new("content/guide", "intro", "Intro", "text").into_index();
        let json = serde_json::to_value(&post).unwrap();

        assert_eq!(json["isIndex"], serde_json::Value::Bool(true));
        assert_eq!(json["collection"], "content/guide");
        assert!(json.get("is_index").is_none());
    }
}
