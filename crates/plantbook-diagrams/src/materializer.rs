//! Markdown replacements for rendered diagrams.
//!
//! The preprocessor must emit markdown, never HTML, so every artifact turns
//! into one of:
//!
//! - an image link into the flat output image directory (file mode)
//! - an image with a base64 data URI (inline mode)
//! - a fenced `txt` block for text-art formats, in both modes

use std::fs;
use std::path::PathBuf;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use plantbook_cache::{Artifact, CacheIoError, write_atomic};

/// Where rendered images end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Copy images into `dir` and link to them relative to the chapter.
    Files {
        /// Output image directory.
        dir: PathBuf,
        /// Name of `dir` as it appears in links.
        dir_name: String,
    },
    /// Embed images as data URIs.
    Inline,
}

/// Builds the markdown that replaces a diagram block.
#[derive(Debug, Clone)]
pub struct Materializer {
    mode: OutputMode,
    clickable: bool,
}

impl Materializer {
    /// Create a materializer. In file mode the output directory is created.
    pub fn new(mode: OutputMode, clickable: bool) -> Result<Self, CacheIoError> {
        if let OutputMode::Files { dir, .. } = &mode {
            fs::create_dir_all(dir).map_err(|e| CacheIoError::new(dir, &e))?;
        }
        Ok(Self { mode, clickable })
    }

    /// Markdown for `artifact` in a chapter nested `depth` levels deep.
    pub fn materialize(&self, artifact: &Artifact, depth: usize) -> Result<String, CacheIoError> {
        let data = fs::read(&artifact.path).map_err(|e| CacheIoError::new(&artifact.path, &e))?;

        let Some(mime) = artifact.format.mime_type() else {
            return Ok(text_block(&String::from_utf8_lossy(&data)));
        };

        let url = match &self.mode {
            OutputMode::Files { dir, dir_name } => {
                let file_name = artifact.key.file_name(artifact.format);
                write_atomic(dir, &file_name, &data)?;
                relative_url(depth, dir_name, &file_name)
            }
            OutputMode::Inline => format!("data:{mime};base64,{}", BASE64_STANDARD.encode(&data)),
        };

        Ok(image_link(&url, self.clickable))
    }
}

/// `("../" × depth) + dir_name + "/" + file_name`.
fn relative_url(depth: usize, dir_name: &str, file_name: &str) -> String {
    format!("{}{dir_name}/{file_name}", "../".repeat(depth))
}

fn image_link(url: &str, clickable: bool) -> String {
    if clickable {
        format!("[![]({url})]({url})\n\n")
    } else {
        format!("![]({url})\n\n")
    }
}

fn text_block(text: &str) -> String {
    let newline = if text.ends_with('\n') { "" } else { "\n" };
    format!("\n```txt\n{text}{newline}```\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantbook_backend::DiagramFormat;
    use plantbook_cache::{ArtifactStore, CacheKey, DirStore};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn image_path(dir: &Path, artifact: &Artifact) -> PathBuf {
        dir.join(artifact.key.file_name(artifact.format))
    }

    fn artifact(cache: &Path, source: &str, format: DiagramFormat, data: &[u8]) -> Artifact {
        let store = DirStore::open(cache.to_path_buf()).unwrap();
        let key = CacheKey::compute(source, format);
        let path = store.put(&key, format, data).unwrap();
        Artifact { key, format, path }
    }

    fn files_mode(dir: &Path) -> OutputMode {
        OutputMode::Files {
            dir: dir.to_path_buf(),
            dir_name: "mdbook-plantuml-img".to_owned(),
        }
    }

    #[test]
    fn test_relative_url_depth() {
        assert_eq!(relative_url(0, "img", "a.svg"), "img/a.svg");
        assert_eq!(relative_url(1, "img", "a.svg"), "../img/a.svg");
        assert_eq!(relative_url(2, "img", "a.svg"), "../../img/a.svg");
    }

    #[test]
    fn test_file_mode_copies_and_links() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("src/mdbook-plantuml-img");
        let art = artifact(&tmp.path().join("cache"), "A -> B", DiagramFormat::Svg, b"<svg/>");
        let materializer = Materializer::new(files_mode(&out), false).unwrap();

        let markdown = materializer.materialize(&art, 1).unwrap();

        let file_name = art.key.file_name(DiagramFormat::Svg);
        assert_eq!(
            markdown,
            format!("![](../mdbook-plantuml-img/{file_name})\n\n")
        );
        assert_eq!(fs::read(image_path(&out, &art)).unwrap(), b"<svg/>");
    }

    #[test]
    fn test_file_mode_clickable() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("img");
        let art = artifact(tmp.path(), "A -> B", DiagramFormat::Png, &[0x89, 0x50]);
        let materializer = Materializer::new(files_mode(&out), true).unwrap();

        let markdown = materializer.materialize(&art, 0).unwrap();

        let url = format!("mdbook-plantuml-img/{}", art.key.file_name(DiagramFormat::Png));
        assert_eq!(markdown, format!("[![]({url})]({url})\n\n"));
    }

    #[test]
    fn test_inline_mode_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("img");
        let art = artifact(&tmp.path().join("cache"), "A -> B", DiagramFormat::Svg, b"test content\n");
        let materializer = Materializer::new(OutputMode::Inline, false).unwrap();

        let markdown = materializer.materialize(&art, 3).unwrap();

        assert_eq!(
            markdown,
            "![](data:image/svg+xml;base64,dGVzdCBjb250ZW50Cg==)\n\n"
        );
        assert!(!out.exists());
    }

    #[test]
    fn test_inline_png_mime() {
        let tmp = TempDir::new().unwrap();
        let art = artifact(tmp.path(), "A -> B", DiagramFormat::Png, b"test content\n");
        let materializer = Materializer::new(OutputMode::Inline, false).unwrap();

        assert_eq!(
            materializer.materialize(&art, 0).unwrap(),
            "![](data:image/png;base64,dGVzdCBjb250ZW50Cg==)\n\n"
        );
    }

    #[test]
    fn test_text_art_is_passthrough_in_both_modes() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("img");
        let art = artifact(&tmp.path().join("cache"), "A -> B", DiagramFormat::Utxt, "┌─┐\n└─┘".as_bytes());

        for mode in [files_mode(&out), OutputMode::Inline] {
            let materializer = Materializer::new(mode, true).unwrap();
            assert_eq!(
                materializer.materialize(&art, 2).unwrap(),
                "\n```txt\n┌─┐\n└─┘\n```\n"
            );
        }
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_artifact_is_error() {
        let tmp = TempDir::new().unwrap();
        let art = Artifact {
            key: CacheKey::compute("A", DiagramFormat::Svg),
            format: DiagramFormat::Svg,
            path: tmp.path().join("gone.svg"),
        };
        let materializer = Materializer::new(OutputMode::Inline, false).unwrap();

        let err = materializer.materialize(&art, 0).unwrap_err();
        assert_eq!(err.path, tmp.path().join("gone.svg"));
    }
}
