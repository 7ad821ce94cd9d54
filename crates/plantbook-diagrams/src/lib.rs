//! Diagram processing for plantbook chapters.
//!
//! This crate turns fenced `PlantUML` blocks in markdown into image
//! references:
//! - [`DiagramExtractor`] finds diagram blocks and resolves their format
//! - [`Materializer`] produces the replacement markdown (file link, data URI
//!   or text block)
//! - [`DiagramProcessor`] renders a chapter's diagrams in parallel through a
//!   [`RenderCache`](plantbook_cache::RenderCache) and substitutes them
//!
//! # Example
//!
//! ```ignore
//! use plantbook_diagrams::{DiagramExtractor, DiagramProcessor, Materializer, OutputMode};
//!
//! let processor = DiagramProcessor::new(
//!     DiagramExtractor::new(vec!["plantuml".to_owned()]),
//!     cache,
//!     Materializer::new(OutputMode::Inline, false)?,
//!     true,
//! );
//! let rewritten = processor.process("```plantuml\nA -> B\n```\n", 0)?;
//! ```

mod extractor;
mod materializer;
mod processor;
mod replacements;

pub use extractor::{DiagramBlock, DiagramExtractor};
pub use materializer::{Materializer, OutputMode};
pub use processor::{DiagramProcessor, ProcessError};
pub use replacements::Replacements;
