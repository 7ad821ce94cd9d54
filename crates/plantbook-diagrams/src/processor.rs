//! Chapter-level diagram processing.
//!
//! [`DiagramProcessor`] runs extraction, rendering and materialization over
//! one chapter's content. The diagrams of a chapter render in parallel; the
//! replacements are then applied in a single pass.

use plantbook_cache::{CacheError, CacheIoError, RenderCache};
use rayon::prelude::*;

use crate::extractor::DiagramExtractor;
use crate::materializer::Materializer;
use crate::replacements::Replacements;

/// Failure while processing a chapter.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A diagram could not be rendered.
    #[error("diagram {index} failed: {source}")]
    Render {
        /// Zero-based position of the diagram in the chapter.
        index: usize,
        /// Render or cache failure.
        source: CacheError,
    },
    /// The replacement for a diagram could not be produced.
    #[error("cannot write diagram output: {0}")]
    Output(#[from] CacheIoError),
}

/// Replaces diagram blocks in chapter content.
pub struct DiagramProcessor {
    extractor: DiagramExtractor,
    cache: RenderCache,
    materializer: Materializer,
    fail_on_error: bool,
}

impl DiagramProcessor {
    /// Create a processor.
    ///
    /// With `fail_on_error` disabled, a diagram that fails to render is
    /// logged and its block is left in place unchanged.
    #[must_use]
    pub fn new(
        extractor: DiagramExtractor,
        cache: RenderCache,
        materializer: Materializer,
        fail_on_error: bool,
    ) -> Self {
        Self {
            extractor,
            cache,
            materializer,
            fail_on_error,
        }
    }

    /// The render cache, for statistics.
    #[must_use]
    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Process one chapter nested `depth` levels below the book root.
    ///
    /// Returns `None` when the content holds no diagram, so the caller can
    /// keep the original text untouched.
    pub fn process(&self, content: &str, depth: usize) -> Result<Option<String>, ProcessError> {
        let blocks = self.extractor.extract(content);
        if blocks.is_empty() {
            return Ok(None);
        }

        let results: Vec<_> = blocks
            .par_iter()
            .map(|block| self.cache.render(&block.source, block.format))
            .collect();

        let mut replacements = Replacements::with_capacity(blocks.len());
        for (index, (block, result)) in blocks.iter().zip(results).enumerate() {
            match result {
                Ok(artifact) => {
                    let markdown = self.materializer.materialize(&artifact, depth)?;
                    replacements.add(block.range.clone(), markdown);
                }
                Err(CacheError::Render(error)) if !self.fail_on_error => {
                    tracing::error!("diagram {index} left unrendered: {error}");
                }
                Err(source) => return Err(ProcessError::Render { index, source }),
            }
        }

        let mut output = content.to_owned();
        replacements.apply(&mut output);
        Ok(Some(output))
    }
}
