//! The transform run: configuration, backend, cache and tree walk.

use plantbook_cache::{DirStore, RenderCache};
use plantbook_config::Config;
use plantbook_diagrams::{DiagramExtractor, DiagramProcessor, Materializer, OutputMode};
use serde_json::Value;

use crate::book::Book;
use crate::error::Error;
use crate::{cleaner, protocol, walker};

/// Transform the raw `[context, book]` payload into the output payload.
///
/// Nothing is returned unless the whole book was transformed.
pub(crate) fn transform(input: &str) -> Result<Vec<u8>, Error> {
    let (context, mut book) = protocol::parse_input(input)?;
    run(&context, &mut book)?;
    Ok(protocol::render_output(&context, &book)?)
}

/// Rewrite every diagram in `book` according to the context configuration.
pub(crate) fn run(context: &Value, book: &mut Book) -> Result<(), Error> {
    protocol::check_host_version(context);

    let config = Config::from_context(context)?;
    tracing::debug!(?config, "loaded configuration");

    // Fail on a broken backend before touching any file
    let backend = plantbook_backend::create(&config.backend_options())?;

    cleaner::clean_output_dir(&config)?;

    let store = DirStore::open(config.cache_dir.clone())?;
    let mode = if config.use_data_uris {
        OutputMode::Inline
    } else {
        OutputMode::Files {
            dir: config.output_dir.clone(),
            dir_name: config.image_dir_name(),
        }
    };
    let processor = DiagramProcessor::new(
        DiagramExtractor::new(config.tags.clone()),
        RenderCache::new(backend, Box::new(store)),
        Materializer::new(mode, config.clickable_img)?,
        config.fail_on_error,
    );

    walker::walk(&mut book.sections, &processor)?;
    processor.cache().log_summary();
    Ok(())
}
