//! Text transform contract applied to document bodies before storage.

use std::path::{Path, PathBuf};

/// Where a body being transformed comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformContext {
    /// Sync root directory.
    pub root: PathBuf,
    /// First-level directory of the document, `None` for files directly under the root.
    pub base: Option<String>,
}

impl TransformContext {
    /// Context for a document inside `base`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, base: Option<String>) -> Self {
        Self {
            root: root.into(),
            base,
        }
    }

    /// Directory of the document's collection.
    #[must_use]
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.base.as_ref().map(|b| self.root.join(b))
    }

    /// Sync root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Transform failure. Callers keep the untransformed body.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A referenced file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// A referenced file is not valid UTF-8.
    #[error("{} is not valid UTF-8", path.display())]
    Encoding {
        /// File that failed.
        path: PathBuf,
    },
}

/// Rewrites a document body.
///
/// Implementations must be deterministic for a given body and filesystem state.
pub trait TextTransform: Send + Sync {
    /// Return the transformed body.
    fn transform(&self, body: &str, ctx: &TransformContext) -> Result<String, TransformError>;
}

/// Transform that returns the body unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl TextTransform for Passthrough {
    fn transform(&self, body: &str, _ctx: &TransformContext) -> Result<String, TransformError> {
        Ok(body.to_owned())
    }
}
