//! Output formats a diagram can be rendered to.

use std::fmt;

/// Output format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DiagramFormat {
    /// Vector image (default).
    #[default]
    Svg,
    /// Raster image.
    Png,
    /// ASCII art.
    Txt,
    /// Unicode art.
    Utxt,
}

impl DiagramFormat {
    /// Parse format from an info string option value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "txt" => Some(Self::Txt),
            "utxt" => Some(Self::Utxt),
            _ => None,
        }
    }

    /// Return format as string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Txt => "txt",
            Self::Utxt => "utxt",
        }
    }

    /// Command line flag selecting this format.
    ///
    /// There must be no space between `-t` and the format name, otherwise
    /// `PlantUML` silently falls back to PNG.
    #[must_use]
    pub fn flag(self) -> String {
        format!("-t{}", self.as_str())
    }

    /// File extension `PlantUML` uses for artifacts of this format.
    ///
    /// `-ttxt` writes `.atxt` files, every other format uses its own name.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Txt => "atxt",
            other => other.as_str(),
        }
    }

    /// Format whose artifacts carry `extension`.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "atxt" => Some(Self::Txt),
            "txt" => None,
            other => Self::parse(other),
        }
    }

    /// MIME type used when embedding the artifact as a data URI.
    ///
    /// Returns `None` for text-art, which is passed through as text.
    #[must_use]
    pub fn mime_type(self) -> Option<&'static str> {
        match self {
            Self::Svg => Some("image/svg+xml"),
            Self::Png => Some("image/png"),
            Self::Txt | Self::Utxt => None,
        }
    }

    /// Whether the artifact is text-art rather than an image.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Self::Txt | Self::Utxt)
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
