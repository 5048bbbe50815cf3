//! Fill resolution and classification.

use crate::ast::Element;
use crate::style::{StyleParser, normalize_value};

/// Fills that paint nothing. Shapes with these fills never take part in the union.
pub const TRANSPARENT_FILLS: &[&str] = &["none", "transparent", "rgba(0,0,0,0)", "hsla(0,0%,0%,0)"];

/// Literal spellings of opaque white.
///
/// This is plain string matching: an equivalent white spelled differently
/// (`#FFFFFFFF`, `rgb(255 255 255)`) is not recognized.
pub const WHITE_FILLS: &[&str] = &[
    "white",
    "#fff",
    "#ffffff",
    "rgb(255,255,255)",
    "rgb(100%,100%,100%)",
    "rgba(255,255,255,1)",
    "hsl(0,0%,100%)",
    "hsla(0,0%,100%,1)",
];

/// How a shape's fill is treated by the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillClass {
    Transparent,
    White,
    Other,
}

/// Classify a resolved fill. `None` is the SVG default, opaque black.
pub fn classify(fill: Option<&str>) -> FillClass {
    let Some(fill) = fill else {
        return FillClass::Other;
    };
    let fill = normalize_value(fill);
    if TRANSPARENT_FILLS.contains(&fill.as_str()) {
        FillClass::Transparent
    } else if WHITE_FILLS.contains(&fill.as_str()) {
        FillClass::White
    } else {
        FillClass::Other
    }
}

/// A set of fill values to exclude from the union.
///
/// Entries and candidates are compared after removing whitespace and
/// lowercasing, so `"RGB(255, 255, 255)"` matches `"rgb(255,255,255)"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipFills {
    fills: Vec<String>,
}

impl SkipFills {
    pub fn new<I, S>(fills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fills: fills
                .into_iter()
                .map(|f| normalize_value(f.as_ref()))
                .filter(|f| !f.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, fill: &str) -> bool {
        let fill = normalize_value(fill);
        self.fills.iter().any(|f| *f == fill)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fills.iter().map(String::as_str)
    }
}

impl Default for SkipFills {
    fn default() -> Self {
        Self::new(WHITE_FILLS.iter().chain(TRANSPARENT_FILLS))
    }
}

/// Decide whether a shape with `fill` takes part in the union.
///
/// Transparent fills are always dropped. White fills listed in `skip` are
/// dropped unless `keep_white` is set; any other listed fill is dropped.
pub fn retains(fill: Option<&str>, skip: &SkipFills, keep_white: bool) -> bool {
    match classify(fill) {
        FillClass::Transparent => false,
        FillClass::White => keep_white || !fill.is_some_and(|f| skip.matches(f)),
        FillClass::Other => !fill.is_some_and(|f| skip.matches(f)),
    }
}

/// The fill an element declares itself: the `fill` attribute first, then the
/// `fill` of its inline style.
///
/// `None` means "not declared here"; `inherit` counts as not declared.
pub fn declared_fill(elem: &Element, styles: &dyn StyleParser) -> Option<String> {
    let attr = elem
        .get_attr("fill")
        .map(normalize_value)
        .filter(|f| !f.is_empty());
    let fill = attr.or_else(|| elem.get_attr("style").and_then(|s| styles.fill(s)))?;
    (fill != "inherit").then_some(fill)
}
