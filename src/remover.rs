//! The overlap-removal pipeline.
//!
//! [`RemoveOverlaps`] walks a document through explicit stages:
//!
//! ```text
//! Unloaded -> Loaded | Normalized -> Parsed -> Filtered -> Unioned -> Rebuilt
//! ```
//!
//! Each operation requires the stage before it and fails with
//! [`Error::Usage`] otherwise. `load` can be called at any stage and starts
//! over.

use std::fmt;
use std::io::{IsTerminal, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use kurbo::BezPath;
use log::Level;

use crate::Options;
use crate::ast::{Document, Element};
use crate::canonicalize::canonicalize;
use crate::clip::protect_clip_paths;
use crate::error::{BoxError, Error, ProcessingError, Step, SvgError};
use crate::fill::retains;
use crate::normalize::{Normalizer, UsvgNormalizer, restore_source_root};
use crate::parse::{parse_svg, parse_svg_bytes};
use crate::rebuild::rebuild;
use crate::serialize::{WriteOptions, serialize};
use crate::shapes::{Shape, collect_shapes};
use crate::style::{CssStyleParser, StyleParser};
use crate::union::{GeoUnioner, PathUnioner};

/// Pipeline stage of a [`RemoveOverlaps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unloaded,
    /// Markup loaded as-is.
    Loaded,
    /// Markup loaded through the normalizer.
    Normalized,
    Parsed,
    Filtered,
    Unioned,
    Rebuilt,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Unloaded => "unloaded",
            Stage::Loaded => "loaded",
            Stage::Normalized => "normalized",
            Stage::Parsed => "parsed",
            Stage::Filtered => "filtered",
            Stage::Unioned => "unioned",
            Stage::Rebuilt => "rebuilt",
        })
    }
}

#[derive(Default)]
enum State {
    #[default]
    Unloaded,
    Loaded {
        markup: String,
        normalized: bool,
        /// Root of the input before normalization.
        source_root: Option<Element>,
    },
    Parsed {
        doc: Document,
    },
    Filtered {
        doc: Document,
        shapes: Vec<Shape>,
    },
    Unioned {
        doc: Document,
        shapes: Vec<Shape>,
        merged: BezPath,
    },
    Rebuilt {
        output: Document,
        shapes: Vec<Shape>,
        merged: BezPath,
    },
}

/// Merges the overlapping shapes of one SVG document into a single path.
///
/// ```no_run
/// use svg_removeoverlap::{Options, RemoveOverlaps};
///
/// let mut remover = RemoveOverlaps::new(Options::default());
/// remover.load("icon.svg")?;
/// remover.remove(false)?;
/// remover.save("icon-merged.svg")?;
/// # Ok::<(), svg_removeoverlap::Error>(())
/// ```
pub struct RemoveOverlaps {
    options: Options,
    normalizer: Box<dyn Normalizer>,
    unioner: Box<dyn PathUnioner>,
    styles: Box<dyn StyleParser>,
    state: State,
}

impl RemoveOverlaps {
    /// A remover using the `usvg` normalizer, the `geo` union and the
    /// built-in style parser.
    pub fn new(options: Options) -> Self {
        Self {
            unioner: Box::new(GeoUnioner::new(options.tolerance)),
            normalizer: Box::new(UsvgNormalizer::new()),
            styles: Box::new(CssStyleParser),
            options,
            state: State::Unloaded,
        }
    }

    pub fn with_unioner(mut self, unioner: impl PathUnioner + 'static) -> Self {
        self.unioner = Box::new(unioner);
        self
    }

    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn with_style_parser(mut self, styles: impl StyleParser + 'static) -> Self {
        self.styles = Box::new(styles);
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn stage(&self) -> Stage {
        match &self.state {
            State::Unloaded => Stage::Unloaded,
            State::Loaded {
                normalized: false, ..
            } => Stage::Loaded,
            State::Loaded {
                normalized: true, ..
            } => Stage::Normalized,
            State::Parsed { .. } => Stage::Parsed,
            State::Filtered { .. } => Stage::Filtered,
            State::Unioned { .. } => Stage::Unioned,
            State::Rebuilt { .. } => Stage::Rebuilt,
        }
    }

    /// Shapes kept for the union, in document order.
    pub fn retained_shapes(&self) -> Option<&[Shape]> {
        match &self.state {
            State::Filtered { shapes, .. }
            | State::Unioned { shapes, .. }
            | State::Rebuilt { shapes, .. } => Some(shapes),
            _ => None,
        }
    }

    /// The union of the retained shapes.
    pub fn merged_path(&self) -> Option<&BezPath> {
        match &self.state {
            State::Unioned { merged, .. } | State::Rebuilt { merged, .. } => Some(merged),
            _ => None,
        }
    }

    /// Read an SVG file and prepare its markup.
    ///
    /// An empty or missing path is [`Error::NotFound`]; a directory or other
    /// non-file is [`Error::NotAFile`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(Error::NotAFile(path.to_path_buf()));
        }
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        log::info!("Loaded {} ({} bytes)", path.display(), data.len());
        self.load_bytes(&data)
    }

    pub fn load_str(&mut self, svg: &str) -> Result<(), Error> {
        self.load_bytes(svg.as_bytes())
    }

    /// Prepare in-memory markup: normalize it when enabled, then protect
    /// clip-path contents.
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        self.state = State::Unloaded;

        let normalized = self.options.normalize;
        let (markup, source_root) = if normalized {
            let markup = guarded(Step::Normalize, || self.normalizer.normalize(data))?;
            (markup, source_root(data))
        } else {
            let markup = std::str::from_utf8(data)
                .map_err(|e| Error::processing(Step::Load, SvgError::from(e)))?
                .to_string();
            (markup, None)
        };
        let markup =
            protect_clip_paths(&markup).map_err(|e| Error::processing(Step::GuardClipPaths, e))?;

        self.state = State::Loaded {
            markup,
            normalized,
            source_root,
        };
        Ok(())
    }

    /// Parse the loaded markup, canonicalizing it when enabled.
    pub fn parse(&mut self) -> Result<(), Error> {
        let State::Loaded {
            markup,
            source_root,
            ..
        } = &self.state
        else {
            return Err(self.usage("parse"));
        };

        let mut doc = parse_svg(markup).map_err(|e| shape_error(Step::Parse, e))?;
        if let Some(source_root) = source_root {
            restore_source_root(&mut doc, source_root);
        }
        if self.options.canonicalize {
            doc = canonicalize(
                &doc,
                self.styles.as_ref(),
                self.options.precision,
                self.options.tolerance,
            )
            .map_err(|e| shape_error(Step::Canonicalize, e))?;
        }

        self.state = State::Parsed { doc };
        Ok(())
    }

    /// Select the shapes that take part in the union.
    pub fn filter(&mut self) -> Result<(), Error> {
        let State::Parsed { doc } = &self.state else {
            return Err(self.usage("filter"));
        };
        let shapes = self.select_shapes(doc)?;

        if let State::Parsed { doc } = std::mem::take(&mut self.state) {
            self.state = State::Filtered { doc, shapes };
        }
        Ok(())
    }

    /// Union the retained shapes, all at once or one shape at a time.
    pub fn union(&mut self, sequential: bool) -> Result<(), Error> {
        let State::Filtered { shapes, .. } = &self.state else {
            return Err(self.usage("union"));
        };
        let merged = self.merge(shapes, sequential)?;

        if let State::Filtered { doc, shapes } = std::mem::take(&mut self.state) {
            self.state = State::Unioned {
                doc,
                shapes,
                merged,
            };
        }
        Ok(())
    }

    /// Build the output document around the merged outline.
    pub fn rebuild(&mut self) -> Result<(), Error> {
        let State::Unioned { doc, merged, .. } = &self.state else {
            return Err(self.usage("rebuild"));
        };
        let output = rebuild(
            doc,
            merged,
            self.options.precision,
            self.options.fill.as_deref(),
        );

        if let State::Unioned { shapes, merged, .. } = std::mem::take(&mut self.state) {
            self.state = State::Rebuilt {
                output,
                shapes,
                merged,
            };
        }
        Ok(())
    }

    /// Run the rest of the pipeline, parsing first if needed.
    pub fn remove(&mut self, sequential: bool) -> Result<(), Error> {
        match self.stage() {
            Stage::Loaded | Stage::Normalized => self.parse()?,
            Stage::Parsed => {}
            _ => return Err(self.usage("remove overlaps")),
        }
        self.filter()?;
        self.union(sequential)?;
        self.rebuild()
    }

    /// The rebuilt document as markup.
    pub fn to_svg_string(&self) -> Result<String, Error> {
        match &self.state {
            State::Rebuilt { output, .. } => Ok(serialize(output, &WriteOptions::default())),
            _ => Err(self.usage("serialize")),
        }
    }

    /// Write the rebuilt document to `path`.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so `path` is either fully replaced or left untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let markup = match &self.state {
            State::Rebuilt { .. } => self.to_svg_string()?,
            _ => return Err(self.usage("save")),
        };

        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
        file.write_all(markup.as_bytes())
            .map_err(|e| Error::io(path, e))?;
        file.persist(path).map_err(|e| Error::io(path, e.error))?;

        log::info!("Wrote {} ({} bytes)", path.display(), markup.len());
        Ok(())
    }

    fn select_shapes(&self, doc: &Document) -> Result<Vec<Shape>, ProcessingError> {
        let shapes = collect_shapes(doc, self.styles.as_ref(), self.options.tolerance)
            .map_err(|e| shape_processing_error(Step::Filter, e))?;
        let level = self.decision_level();

        let total = shapes.len();
        let progress = self.progress_bar(total, "Converting paths");
        let mut retained = Vec::with_capacity(total);
        for shape in shapes {
            let fill = shape.fill.as_deref();
            let keep = retains(fill, &self.options.skip_fills, self.options.keep_white);
            progress.suspend(|| {
                let verb = if keep { "Keeping" } else { "Skipping" };
                log::log!(level, "{} shape {} <{}> (fill {})", verb, shape.index, shape.element, fill.unwrap_or("default"));
            });
            if keep {
                retained.push(shape);
            }
            progress.inc(1);
        }
        progress.finish_and_clear();
        log::info!("Retained {} of {} shape(s)", retained.len(), total);
        Ok(retained)
    }

    fn merge(&self, shapes: &[Shape], sequential: bool) -> Result<BezPath, ProcessingError> {
        let Some((first, rest)) = shapes.split_first() else {
            log::info!("No shapes to merge, the output has no geometry");
            return Ok(BezPath::new());
        };

        if !sequential {
            let outlines: Vec<BezPath> = shapes.iter().map(|s| s.outline.clone()).collect();
            return guarded(Step::Union, || self.unioner.union(&outlines));
        }

        if rest.is_empty() {
            // Still merges the subpaths of a self-overlapping outline.
            let single = std::slice::from_ref(&first.outline);
            return guarded(Step::Union, || self.unioner.union(single))
                .map_err(|e| e.with_shape(first.index));
        }

        let level = self.decision_level();
        let progress = self.progress_bar(shapes.len(), "Removing overlaps");
        progress.inc(1);
        let mut merged = first.outline.clone();
        for shape in rest {
            progress.suspend(|| log::log!(level, "Merging shape {}", shape.index));
            let pair = [merged, shape.outline.clone()];
            merged = guarded(Step::Union, || self.unioner.union(&pair))
                .map_err(|e| e.with_shape(shape.index))?;
            progress.inc(1);
        }
        progress.finish_and_clear();
        Ok(merged)
    }

    /// A bar on stderr, drawn only in verbose mode on a terminal.
    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.options.verbose || !std::io::stderr().is_terminal() {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message);
        pb
    }

    fn decision_level(&self) -> Level {
        if self.options.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    fn usage(&self, operation: &'static str) -> Error {
        Error::Usage {
            operation,
            stage: self.stage(),
        }
    }
}

/// The input's root element, without children, when it can be read.
fn source_root(data: &[u8]) -> Option<Element> {
    match parse_svg_bytes(data) {
        Ok(doc) => Some(Element {
            children: Vec::new(),
            ..doc.root
        }),
        Err(e) => {
            log::warn!("Keeping the normalized root attributes, the input root is unreadable: {}", e);
            None
        }
    }
}

/// Call an external capability, turning its errors and panics into a
/// [`ProcessingError`] for `step`.
fn guarded<T>(
    step: Step,
    f: impl FnOnce() -> Result<T, BoxError>,
) -> Result<T, ProcessingError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result.map_err(|e| ProcessingError::new(step, e)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ProcessingError::new(step, format!("panicked: {}", message)))
        }
    }
}

fn shape_processing_error(step: Step, err: SvgError) -> ProcessingError {
    let index = match &err {
        SvgError::InvalidShape { index, .. } => Some(*index),
        _ => None,
    };
    let err = ProcessingError::new(step, err);
    match index {
        Some(index) => err.with_shape(index),
        None => err,
    }
}

fn shape_error(step: Step, err: SvgError) -> Error {
    Error::Processing(shape_processing_error(step, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const TWO_RECTS: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 20">
  <rect width="10" height="10" fill="red"/>
  <rect x="5" y="5" width="10" height="10" fill="white"/>
  <rect x="5" y="5" width="10" height="10"/>
</svg>"#;

    fn options() -> Options {
        Options {
            normalize: false,
            ..Options::default()
        }
    }

    /// Records the arity of every union call and returns the first outline.
    #[derive(Clone, Default)]
    struct RecordingUnioner {
        calls: Rc<RefCell<Vec<usize>>>,
    }

    impl PathUnioner for RecordingUnioner {
        fn union(&self, paths: &[BezPath]) -> Result<BezPath, BoxError> {
            self.calls.borrow_mut().push(paths.len());
            Ok(paths[0].clone())
        }
    }

    struct FailingUnioner;

    impl PathUnioner for FailingUnioner {
        fn union(&self, _paths: &[BezPath]) -> Result<BezPath, BoxError> {
            Err("backend exploded".into())
        }
    }

    struct PanickingUnioner;

    impl PathUnioner for PanickingUnioner {
        fn union(&self, _paths: &[BezPath]) -> Result<BezPath, BoxError> {
            panic!("degenerate input")
        }
    }

    struct FailingNormalizer;

    impl Normalizer for FailingNormalizer {
        fn normalize(&self, _svg: &[u8]) -> Result<String, BoxError> {
            Err("cannot normalize".into())
        }
    }

    #[test]
    fn test_stages_advance() {
        let mut remover = RemoveOverlaps::new(options());
        assert_eq!(remover.stage(), Stage::Unloaded);
        remover.load_str(TWO_RECTS).unwrap();
        assert_eq!(remover.stage(), Stage::Loaded);
        remover.parse().unwrap();
        assert_eq!(remover.stage(), Stage::Parsed);
        remover.filter().unwrap();
        assert_eq!(remover.stage(), Stage::Filtered);
        assert_eq!(remover.retained_shapes().unwrap().len(), 2);
        remover.union(false).unwrap();
        assert_eq!(remover.stage(), Stage::Unioned);
        remover.rebuild().unwrap();
        assert_eq!(remover.stage(), Stage::Rebuilt);
        assert!(remover.to_svg_string().unwrap().contains("<path d=\"M"));
    }

    #[test]
    fn test_out_of_order_calls_are_usage_errors() {
        let mut remover = RemoveOverlaps::new(options());
        match remover.remove(false) {
            Err(Error::Usage { operation, stage }) => {
                assert_eq!(operation, "remove overlaps");
                assert_eq!(stage, Stage::Unloaded);
            }
            other => panic!("expected usage error, got {:?}", other),
        }
        assert!(matches!(remover.parse(), Err(Error::Usage { .. })));
        assert!(matches!(remover.save("out.svg"), Err(Error::Usage { .. })));

        remover.load_str(TWO_RECTS).unwrap();
        assert!(matches!(remover.union(false), Err(Error::Usage { .. })));
        assert!(matches!(remover.rebuild(), Err(Error::Usage { .. })));
        assert!(matches!(remover.to_svg_string(), Err(Error::Usage { .. })));
        // A failed call leaves the stage alone.
        assert_eq!(remover.stage(), Stage::Loaded);

        remover.remove(false).unwrap();
        let err = remover.remove(false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot remove overlaps while the remover is rebuilt"
        );
    }

    #[test]
    fn test_batch_calls_union_once() {
        let unioner = RecordingUnioner::default();
        let calls = unioner.calls.clone();
        let mut remover = RemoveOverlaps::new(options()).with_unioner(unioner);
        remover.load_str(TWO_RECTS).unwrap();
        remover.remove(false).unwrap();
        assert_eq!(*calls.borrow(), [2]);
    }

    #[test]
    fn test_sequential_calls_union_pairwise() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
  <rect width="1" height="1"/><rect width="2" height="2"/><rect width="3" height="3"/><rect width="4" height="4"/>
</svg>"#;
        let unioner = RecordingUnioner::default();
        let calls = unioner.calls.clone();
        let mut remover = RemoveOverlaps::new(options()).with_unioner(unioner);
        remover.load_str(svg).unwrap();
        remover.remove(true).unwrap();
        assert_eq!(*calls.borrow(), [2, 2, 2]);
    }

    #[test]
    fn test_sequential_single_shape_goes_through_union() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><path d="M0 0h10v10h-10z M5 5h10v10h-10z"/></svg>"#;
        let unioner = RecordingUnioner::default();
        let calls = unioner.calls.clone();
        let mut remover = RemoveOverlaps::new(options()).with_unioner(unioner);
        remover.load_str(svg).unwrap();
        remover.remove(true).unwrap();
        assert_eq!(*calls.borrow(), [1]);
    }

    #[test]
    fn test_progress_bar_only_when_verbose() {
        let quiet = RemoveOverlaps::new(options());
        assert!(quiet.progress_bar(3, "Converting paths").is_hidden());

        let verbose = RemoveOverlaps::new(Options {
            verbose: true,
            ..options()
        });
        let bar = verbose.progress_bar(3, "Converting paths");
        assert_eq!(bar.is_hidden(), !std::io::stderr().is_terminal());
    }

    #[test]
    fn test_verbose_run_matches_quiet_run() {
        let mut quiet = RemoveOverlaps::new(options());
        quiet.load_str(TWO_RECTS).unwrap();
        quiet.remove(true).unwrap();

        let mut verbose = RemoveOverlaps::new(Options {
            verbose: true,
            ..options()
        });
        verbose.load_str(TWO_RECTS).unwrap();
        verbose.remove(true).unwrap();
        assert_eq!(verbose.to_svg_string().unwrap(), quiet.to_svg_string().unwrap());
    }

    #[test]
    fn test_empty_selection_skips_union() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="5" height="5" fill="none"/></svg>"#;
        for sequential in [false, true] {
            let mut remover = RemoveOverlaps::new(options()).with_unioner(FailingUnioner);
            remover.load_str(svg).unwrap();
            remover.remove(sequential).unwrap();
            assert!(remover.merged_path().unwrap().elements().is_empty());
            assert!(!remover.to_svg_string().unwrap().contains("<path"));
        }
    }

    #[test]
    fn test_union_failure_is_processing_error() {
        let mut remover = RemoveOverlaps::new(options()).with_unioner(FailingUnioner);
        remover.load_str(TWO_RECTS).unwrap();
        match remover.remove(false) {
            Err(Error::Processing(e)) => {
                assert_eq!(e.step, Step::Union);
                assert_eq!(e.shape, None);
                assert_eq!(e.source.to_string(), "backend exploded");
            }
            other => panic!("expected processing error, got {:?}", other),
        }
    }

    #[test]
    fn test_sequential_failure_names_the_shape() {
        let mut remover = RemoveOverlaps::new(options()).with_unioner(FailingUnioner);
        remover.load_str(TWO_RECTS).unwrap();
        match remover.remove(true) {
            // Shape 1 is the white one, skipped; shape 2 is the first union.
            Err(Error::Processing(e)) => assert_eq!(e.shape, Some(2)),
            other => panic!("expected processing error, got {:?}", other),
        }
    }

    #[test]
    fn test_backend_panic_is_caught() {
        let mut remover = RemoveOverlaps::new(options()).with_unioner(PanickingUnioner);
        remover.load_str(TWO_RECTS).unwrap();
        let err = remover.remove(false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "processing error: union failed: panicked: degenerate input"
        );
    }

    #[test]
    fn test_normalizer_failure_is_processing_error() {
        let mut remover = RemoveOverlaps::new(Options::default()).with_normalizer(FailingNormalizer);
        match remover.load_str(TWO_RECTS) {
            Err(Error::Processing(e)) => assert_eq!(e.step, Step::Normalize),
            other => panic!("expected processing error, got {:?}", other),
        }
        assert_eq!(remover.stage(), Stage::Unloaded);
    }

    #[test]
    fn test_invalid_shape_reports_index() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="1" height="1"/><path d="M0 0 L"/></svg>"#;
        let mut remover = RemoveOverlaps::new(options());
        remover.load_str(svg).unwrap();
        remover.parse().unwrap();
        match remover.filter() {
            Err(Error::Processing(e)) => {
                assert_eq!(e.step, Step::Filter);
                assert_eq!(e.shape, Some(1));
            }
            other => panic!("expected processing error, got {:?}", other),
        }
        assert_eq!(remover.stage(), Stage::Parsed);
    }

    #[test]
    fn test_malformed_markup() {
        let mut remover = RemoveOverlaps::new(options());
        let err = remover.load_str("<svg><g></svg>").unwrap_err();
        assert!(matches!(
            err,
            Error::Processing(ProcessingError {
                step: Step::GuardClipPaths,
                ..
            })
        ));
    }
}
