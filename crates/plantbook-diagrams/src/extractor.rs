//! Diagram block extraction from chapter markdown.
//!
//! Only fenced code blocks matter here: the scanner walks the content line
//! by line, tracks every fence (so diagram-looking text inside an unrelated
//! block is left alone) and reports the blocks whose info string starts with
//! a diagram tag, together with their byte range in the original content.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use plantbook_backend::DiagramFormat;
use regex::Regex;

/// Opening fence: up to three spaces, three or more backticks or tildes,
/// then the info string.
static FENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^( {0,3})(`{3,}|~{3,})(.*)$").unwrap());

/// Marker of the ditaa dialect, which `PlantUML` only renders as PNG.
const DITAA_MARKER: &str = "@startditaa";

/// A diagram found in chapter content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// Diagram source without fences and surrounding blank lines.
    pub source: String,
    /// Resolved output format.
    pub format: DiagramFormat,
    /// `key=value` options from the info string (valueless keys map to "").
    pub options: HashMap<String, String>,
    /// Byte range of the whole block, fences included.
    pub range: Range<usize>,
}

/// Finds diagram blocks for a set of fence tags.
#[derive(Debug, Clone)]
pub struct DiagramExtractor {
    tags: Vec<String>,
}

/// An open fence while scanning.
struct OpenFence<'a> {
    start: usize,
    indent: usize,
    fence_char: char,
    width: usize,
    info: &'a str,
    body: Vec<&'a str>,
}

impl DiagramExtractor {
    /// Create an extractor recognizing the given tags.
    #[must_use]
    pub fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    /// Extract diagram blocks in document order.
    ///
    /// An unclosed fence runs to the end of the content.
    #[must_use]
    pub fn extract(&self, content: &str) -> Vec<DiagramBlock> {
        let mut blocks = Vec::new();
        let mut open: Option<OpenFence<'_>> = None;
        let mut offset = 0;

        for raw_line in content.split_inclusive('\n') {
            let line_start = offset;
            offset += raw_line.len();
            let line = raw_line.trim_end_matches(['\n', '\r']);

            if let Some(fence) = open.as_mut() {
                if is_closing_fence(line, fence.fence_char, fence.width) {
                    if let Some(fence) = open.take() {
                        self.push_block(&mut blocks, fence, offset);
                    }
                } else {
                    fence.body.push(strip_indent(line, fence.indent));
                }
                continue;
            }

            open = parse_opening_fence(line, line_start);
        }

        if let Some(fence) = open {
            self.push_block(&mut blocks, fence, content.len());
        }
        blocks
    }

    fn push_block(&self, blocks: &mut Vec<DiagramBlock>, fence: OpenFence<'_>, end: usize) {
        let info = InfoString::parse(fence.info);
        if !info
            .language
            .is_some_and(|language| self.tags.iter().any(|tag| tag == language))
        {
            return;
        }

        let source = trim_blank_lines(&fence.body);
        let format = resolve_format(&info.options, &source);
        blocks.push(DiagramBlock {
            source,
            format,
            options: info.options,
            range: fence.start..end,
        });
    }
}

fn parse_opening_fence(line: &str, start: usize) -> Option<OpenFence<'_>> {
    let captures = FENCE_PATTERN.captures(line)?;
    let indent = captures.get(1)?.as_str().len();
    let fence = captures.get(2)?.as_str();
    let info = captures.get(3)?.as_str();
    let fence_char = fence.chars().next()?;

    // Backtick fences cannot carry backticks in their info string
    if fence_char == '`' && info.contains('`') {
        return None;
    }

    Some(OpenFence {
        start,
        indent,
        fence_char,
        width: fence.len(),
        info: info.trim(),
        body: Vec::new(),
    })
}

fn is_closing_fence(line: &str, fence_char: char, width: usize) -> bool {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let run = rest.len() - rest.trim_start_matches(fence_char).len();
    run >= width && rest[run..].trim().is_empty()
}

/// Remove up to `indent` leading spaces, as for content of an indented fence.
fn strip_indent(line: &str, indent: usize) -> &str {
    let spaces = line.len() - line.trim_start_matches(' ').len();
    &line[spaces.min(indent)..]
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let first = lines.iter().position(|line| !line.trim().is_empty());
    let last = lines.iter().rposition(|line| !line.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n"),
        _ => String::new(),
    }
}

/// Resolve the output format of a block.
///
/// An explicit `format=` option wins, then the ditaa marker selects PNG,
/// otherwise the default (SVG) applies.
fn resolve_format(options: &HashMap<String, String>, source: &str) -> DiagramFormat {
    let fallback = if source.contains(DITAA_MARKER) {
        DiagramFormat::Png
    } else {
        DiagramFormat::default()
    };

    options.get("format").map_or(fallback, |value| {
        DiagramFormat::parse(value).unwrap_or_else(|| {
            tracing::warn!(
                "unknown diagram format '{value}', using '{fallback}' (valid: svg, png, txt, utxt)"
            );
            fallback
        })
    })
}

/// Parsed fence info string.
///
/// Tokens are separated by commas or spaces. The first token is the
/// language unless it contains `=`; the remaining tokens are options.
struct InfoString<'a> {
    language: Option<&'a str>,
    options: HashMap<String, String>,
}

impl<'a> InfoString<'a> {
    fn parse(info: &'a str) -> Self {
        let mut language = None;
        let mut options = HashMap::new();

        for (i, token) in info
            .split([',', ' '])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .enumerate()
        {
            if i == 0 && !token.contains('=') {
                language = Some(token);
                continue;
            }
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            let key = key.trim();
            if !key.is_empty() {
                options.insert(key.to_owned(), value.trim().to_owned());
            }
        }

        Self { language, options }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extractor() -> DiagramExtractor {
        DiagramExtractor::new(vec!["plantuml".to_owned(), "puml".to_owned()])
    }

    #[test]
    fn test_extract_single_block() {
        let content = "# Title\n\n```plantuml\n@startuml\nA -> B\n@enduml\n```\n\nAfter\n";
        let blocks = extractor().extract(content);

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.source, "@startuml\nA -> B\n@enduml");
        assert_eq!(block.format, DiagramFormat::Svg);
        assert!(block.options.is_empty());
        assert_eq!(
            &content[block.range.clone()],
            "```plantuml\n@startuml\nA -> B\n@enduml\n```\n"
        );
    }

    #[test]
    fn test_extract_multiple_blocks_in_order() {
        let content = "```plantuml\nfirst\n```\ntext\n```puml\nsecond\n```";
        let blocks = extractor().extract(content);

        let sources: Vec<_> = blocks.iter().map(|b| b.source.as_str()).collect();
        assert_eq!(sources, vec!["first", "second"]);
        assert_eq!(&content[blocks[1].range.clone()], "```puml\nsecond\n```");
    }

    #[test]
    fn test_other_languages_ignored() {
        let content = "```rust\nfn main() {}\n```\n\n$$a^2 + b^2$$\n\n```mermaid\ngraph TD\n```\n";
        assert!(extractor().extract(content).is_empty());
    }

    #[test]
    fn test_diagram_inside_other_fence_ignored() {
        let content = "````markdown\n```plantuml\nA -> B\n```\n````\n";
        assert!(extractor().extract(content).is_empty());
    }

    #[test]
    fn test_tag_must_be_whole_first_token() {
        let content = "```plantumlx\nA\n```\n```text plantuml\nB\n```\n";
        assert!(extractor().extract(content).is_empty());
    }

    #[test]
    fn test_custom_tag_only() {
        let content = "```uml\nA -> B\n```\n```plantuml\nC -> D\n```\n";
        let blocks = DiagramExtractor::new(vec!["uml".to_owned()]).extract(content);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "A -> B");
    }

    #[test]
    fn test_tilde_and_long_fences() {
        let content = "~~~plantuml\nA -> B\n~~~\n`````plantuml\n```\nC\n`````\n";
        let blocks = extractor().extract(content);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].source, "A -> B");
        assert_eq!(blocks[1].source, "```\nC");
    }

    #[test]
    fn test_indented_fence_strips_indent() {
        let content = "  ```plantuml\n  @startuml\n    A -> B\n  @enduml\n  ```\n";
        let blocks = extractor().extract(content);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "@startuml\n  A -> B\n@enduml");
        assert_eq!(blocks[0].range, 0..content.len());
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let content = "intro\n```plantuml\nA -> B\n";
        let blocks = extractor().extract(content);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "A -> B");
        assert_eq!(blocks[0].range, 6..content.len());
    }

    #[test]
    fn test_blank_lines_trimmed() {
        let padded = "```plantuml\n\n  \nA -> B\n\n```\n";
        let canonical = "```plantuml\nA -> B\n```\n";

        assert_eq!(
            extractor().extract(padded)[0].source,
            extractor().extract(canonical)[0].source
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let content = "```plantuml\r\nA -> B\r\n```\r\nafter";
        let blocks = extractor().extract(content);

        assert_eq!(blocks[0].source, "A -> B");
        assert_eq!(&content[blocks[0].range.clone()], "```plantuml\r\nA -> B\r\n```\r\n");
    }

    #[test]
    fn test_options_parsed() {
        let content = "```plantuml,format=png, width=300 clickable\nA\n```\n";
        let block = &extractor().extract(content)[0];

        assert_eq!(block.format, DiagramFormat::Png);
        assert_eq!(block.options.get("format").map(String::as_str), Some("png"));
        assert_eq!(block.options.get("width").map(String::as_str), Some("300"));
        assert_eq!(block.options.get("clickable").map(String::as_str), Some(""));
    }

    #[test]
    fn test_ditaa_defaults_to_png() {
        let content = "```plantuml\n@startditaa\n+---+\n| A |\n+---+\n@endditaa\n```\n";
        assert_eq!(extractor().extract(content)[0].format, DiagramFormat::Png);
    }

    #[test]
    fn test_explicit_format_beats_ditaa() {
        let content = "```plantuml,format=utxt\n@startditaa\n+-+\n@endditaa\n```\n";
        assert_eq!(extractor().extract(content)[0].format, DiagramFormat::Utxt);
    }

    #[test]
    fn test_unknown_format_falls_back() {
        let content = "```plantuml,format=gif\nA -> B\n```\n";
        assert_eq!(extractor().extract(content)[0].format, DiagramFormat::Svg);

        let ditaa = "```plantuml,format=gif\n@startditaa\n@endditaa\n```\n";
        assert_eq!(extractor().extract(ditaa)[0].format, DiagramFormat::Png);
    }
}
