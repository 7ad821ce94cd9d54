//! Removal of the previous run's output images.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use plantbook_cache::{CacheIoError, CacheKey};
use plantbook_config::Config;

/// Remove the images a previous file-mode run left in the output directory.
///
/// The output directory is flat, so only its top-level regular files named
/// like rendered artifacts (`<digest>.<extension>`) are removed.
/// Subdirectories and every other file are kept, which makes an output
/// directory shared with book sources safe to clean.
///
/// Does nothing in inline mode, with `skip-clean`, or when the render cache
/// lives inside the output directory.
pub(crate) fn clean_output_dir(config: &Config) -> Result<(), CacheIoError> {
    if config.use_data_uris || config.skip_clean {
        return Ok(());
    }

    let dir = &config.output_dir;
    if config.cache_dir.starts_with(dir) {
        tracing::warn!(
            output_dir = %dir.display(),
            "render cache is inside the output image directory, not cleaning"
        );
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CacheIoError::new(dir, &e)),
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| CacheIoError::new(dir, &e))?;
        let path = entry.path();
        if is_stale_artifact(&entry)? {
            remove_file(&path)?;
            removed += 1;
        }
    }
    tracing::debug!(output_dir = %dir.display(), removed, "removed previous output images");
    Ok(())
}

fn is_stale_artifact(entry: &fs::DirEntry) -> Result<bool, CacheIoError> {
    let file_type = entry
        .file_type()
        .map_err(|e| CacheIoError::new(&entry.path(), &e))?;
    if !file_type.is_file() {
        return Ok(false);
    }
    Ok(entry
        .file_name()
        .to_str()
        .is_some_and(CacheKey::is_artifact_file_name))
}

fn remove_file(path: &Path) -> Result<(), CacheIoError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheIoError::new(path, &e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantbook_backend::DiagramFormat;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(root: &Path, use_data_uris: bool, skip_clean: bool) -> Config {
        Config {
            use_data_uris,
            skip_clean,
            output_dir: root.join("src/img"),
            cache_dir: root.join(".cache"),
            ..Config::default()
        }
    }

    fn artifact_name(source: &str, format: DiagramFormat) -> String {
        CacheKey::compute(source, format).file_name(format)
    }

    /// Write one artifact into `src/img` and `.cache`, returning its name.
    fn populate(root: &Path) -> String {
        let name = artifact_name("A -> B", DiagramFormat::Svg);
        for dir in ["src/img", ".cache"] {
            fs::create_dir_all(root.join(dir)).unwrap();
            fs::write(root.join(dir).join(&name), "<svg/>").unwrap();
        }
        name
    }

    #[test]
    fn test_file_mode_removes_artifacts_only_from_output_dir() {
        let tmp = TempDir::new().unwrap();
        let name = populate(tmp.path());

        clean_output_dir(&config(tmp.path(), false, false)).unwrap();

        assert!(!tmp.path().join("src/img").join(&name).exists());
        assert!(tmp.path().join("src/img").is_dir());
        assert!(tmp.path().join(".cache").join(&name).is_file());
    }

    #[test]
    fn test_skip_clean_and_inline_mode_keep_output() {
        let tmp = TempDir::new().unwrap();
        let name = populate(tmp.path());

        clean_output_dir(&config(tmp.path(), false, true)).unwrap();
        clean_output_dir(&config(tmp.path(), true, false)).unwrap();

        assert!(tmp.path().join("src/img").join(name).is_file());
    }

    #[test]
    fn test_output_dir_shared_with_sources_keeps_sources() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let png = artifact_name("C -> D", DiagramFormat::Png);
        let text = artifact_name("C -> D", DiagramFormat::Txt);
        let sources: Vec<PathBuf> = ["SUMMARY.md", "guide/intro.md", "diagram.svg"]
            .iter()
            .map(|name| src.join(name))
            .collect();
        fs::create_dir_all(src.join("guide")).unwrap();
        for path in &sources {
            fs::write(path, "keep me").unwrap();
        }
        fs::write(src.join(&png), [0x89, 0x50]).unwrap();
        fs::write(src.join(&text), "art").unwrap();
        // Artifact-named entries below the top level are never touched
        fs::write(src.join("guide").join(&png), [0x89, 0x50]).unwrap();

        let section = serde_json::json!({"use-data-uris": false, "output-dir": "src"});
        let config = Config::load(Some(&section), tmp.path(), Path::new("src")).unwrap();
        assert_eq!(config.output_dir, src);
        clean_output_dir(&config).unwrap();

        for path in &sources {
            assert!(path.is_file(), "{} was removed", path.display());
        }
        assert!(src.join("guide").join(&png).is_file());
        assert!(!src.join(png).exists());
        assert!(!src.join(text).exists());
    }

    #[test]
    fn test_artifact_named_directory_is_kept() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/img").join(artifact_name("A", DiagramFormat::Svg));
        fs::create_dir_all(&dir).unwrap();

        clean_output_dir(&config(tmp.path(), false, false)).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_missing_output_dir_is_fine() {
        let tmp = TempDir::new().unwrap();
        clean_output_dir(&config(tmp.path(), false, false)).unwrap();
    }

    #[test]
    fn test_cache_inside_output_dir_is_never_removed() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(tmp.path(), false, false);
        config.cache_dir = config.output_dir.join("cache");
        fs::create_dir_all(&config.cache_dir).unwrap();

        clean_output_dir(&config).unwrap();
        assert!(config.cache_dir.is_dir());
    }
}
