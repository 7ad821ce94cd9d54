//! Byte-range substitution of diagram blocks.

use std::ops::Range;

/// Collects block replacements for single-pass application.
///
/// Ranges come from one extraction pass over the same content, so they are
/// sorted and never overlap. They are applied back to front so earlier
/// offsets stay valid while later text changes length.
#[derive(Debug, Default)]
pub struct Replacements {
    items: Vec<(Range<usize>, String)>,
}

impl Replacements {
    /// Create an empty set with room for `capacity` replacements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Replace the bytes in `range` with `content`.
    pub fn add(&mut self, range: Range<usize>, content: String) {
        self.items.push((range, content));
    }

    /// Whether no replacement was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Apply all replacements to `text`.
    pub fn apply(mut self, text: &mut String) {
        self.items.sort_by_key(|(range, _)| range.start);
        for (range, content) in self.items.into_iter().rev() {
            text.replace_range(range, &content);
        }
    }
}
