//! Diagram macro expansion for mdsync.
//!
//! This crate provides the text transform applied to document bodies before they are
//! stored, plus the client used to proxy image requests to a `PlantUML` server:
//! - [`TextTransform`] is the transform contract, with [`TransformContext`] describing
//!   where the body lives on disk
//! - [`PlantUmlTransform`] rewrites ```` ```plantuml ```` blocks and `.puml` image
//!   references into links under the public diagram prefix
//! - [`PlantUmlProxy`] fetches rendered images from the `PlantUML` server
//!
//! # Example
//!
//! ```ignore
//! use mdsync_diagrams::{PlantUmlTransform, TextTransform, TransformContext};
//!
//! let transform = PlantUmlTransform::new("/plantuml");
//! let ctx = TransformContext::new("content", Some("guide".to_owned()));
//! let body = transform.transform("```plantuml\nA -> B\n```", &ctx)?;
//! assert!(body.starts_with("![PlantUML Diagram](/plantuml/png/~h"));
//! ```

mod consts;
mod plantuml;
mod proxy;
mod transform;

pub use plantuml::{PlantUmlTransform, encode_text};
pub use proxy::{PlantUmlProxy, ProxyError, ProxyResponse};
pub use transform::{Passthrough, TextTransform, TransformContext, TransformError};
