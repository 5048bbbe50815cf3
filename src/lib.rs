//! svg-removeoverlap - merge the overlapping shapes of an SVG into one path.
//!
//! Shapes are converted to outlines, filtered by fill (white and transparent
//! fills are skipped by default, clip-path contents always are), unioned
//! and written back as a single `<path>` under the original root element.

mod ast;
mod canonicalize;
mod clip;
mod error;
mod fill;
mod normalize;
mod parse;
mod path;
mod rebuild;
mod remover;
mod serialize;
mod shapes;
mod style;
mod union;

use std::path::Path;

pub use ast::*;
pub use canonicalize::canonicalize;
pub use clip::{PROTECTED_FILL, protect_clip_paths, protect_document};
pub use error::*;
pub use fill::{FillClass, SkipFills, TRANSPARENT_FILLS, WHITE_FILLS, classify, declared_fill, retains};
pub use normalize::{Normalizer, UsvgNormalizer};
pub use parse::*;
pub use path::{Command, Path as PathData, parse_path, to_bez_path, write_bez_path};
pub use rebuild::rebuild;
pub use remover::{RemoveOverlaps, Stage};
pub use serialize::*;
pub use shapes::{SHAPE_ELEMENTS, Shape, collect_shapes};
pub use style::{CssStyleParser, StyleParser};
pub use union::{GeoUnioner, PathUnioner};

/// Remove the overlaps of the SVG at `input` and write the result to `output`.
///
/// `output` is only written once the whole pipeline has succeeded.
pub fn remove_overlaps(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &Options,
    sequential: bool,
) -> Result<(), Error> {
    let mut remover = RemoveOverlaps::new(options.clone());
    remover.load(input)?;
    remover.remove(sequential)?;
    remover.save(output)
}

/// Overlap removal options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Run the normalizer when loading (default: true)
    pub normalize: bool,
    /// Canonicalize the document after parsing (default: false)
    pub canonicalize: bool,
    /// Merge white-filled shapes instead of skipping them
    pub keep_white: bool,
    /// Fills whose shapes are left out of the union
    pub skip_fills: SkipFills,
    /// Log every per-shape decision at info level
    pub verbose: bool,
    /// Number of decimal places for coordinates (default: 3)
    pub precision: u8,
    /// Curve flattening tolerance in user units (default: 0.05)
    pub tolerance: f64,
    /// Fill of the merged path; `None` leaves the SVG default
    pub fill: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            normalize: true,
            canonicalize: false,
            keep_white: false,
            skip_fills: SkipFills::default(),
            verbose: false,
            precision: 3,
            tolerance: 0.05,
            fill: None,
        }
    }
}
