//! Document tree traversal.

use plantbook_diagrams::DiagramProcessor;

use crate::book::BookItem;
use crate::error::Error;

/// Rewrite the diagrams of every chapter under `items`.
///
/// Pre-order: a chapter is processed before its sub-items, and a chapter's
/// sub-items before its next sibling. Root chapters are at depth 0. Section
/// order and every non-chapter section are left as they are.
pub(crate) fn walk(items: &mut [BookItem], processor: &DiagramProcessor) -> Result<(), Error> {
    walk_at_depth(items, 0, processor)
}

fn walk_at_depth(
    items: &mut [BookItem],
    depth: usize,
    processor: &DiagramProcessor,
) -> Result<(), Error> {
    for item in items.iter_mut() {
        let BookItem::Chapter(chapter) = item else {
            continue;
        };

        tracing::debug!(chapter = %chapter.name, depth, "processing chapter");
        let rewritten = processor
            .process(&chapter.content, depth)
            .map_err(|source| Error::Chapter {
                chapter: chapter.name.clone(),
                source,
            })?;
        if let Some(content) = rewritten {
            chapter.content = content;
        }

        walk_at_depth(&mut chapter.sub_items, depth + 1, processor)?;
    }
    Ok(())
}
