//! Inline `style` attribute handling.

use simplecss::{Declaration, DeclarationTokenizer};

/// Extracts the fill declared in an inline style.
///
/// Implementations must not fail: a style that cannot be understood
/// declares nothing.
pub trait StyleParser {
    /// The first `fill` value declared in `style`, if any.
    fn fill(&self, style: &str) -> Option<String>;
}

/// A small CSS declaration-list parser.
///
/// Returns the first component value of the first `fill` declaration, with
/// whitespace removed and ASCII letters lowercased, so `fill: RGB(0, 255, 0)`
/// yields `rgb(0,255,0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssStyleParser;

impl StyleParser for CssStyleParser {
    fn fill(&self, style: &str) -> Option<String> {
        declarations(style)
            .find(|decl| decl.name.eq_ignore_ascii_case("fill"))
            .and_then(|decl| first_component(decl.value))
            .map(normalize_value)
            .filter(|value| !value.is_empty())
    }
}

/// Iterate the declarations of an inline style, in order.
///
/// Tokenizing stops at the first malformed declaration; what came before it
/// is still reported.
pub fn declarations(style: &str) -> impl Iterator<Item = Declaration<'_>> {
    DeclarationTokenizer::from(style)
}

/// The first component value: an identifier, hash, number or a whole
/// function call.
fn first_component(value: &str) -> Option<&str> {
    let value = value.trim();
    let mut depth = 0usize;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&value[..=i]);
                }
            }
            c if c.is_whitespace() && depth == 0 => return Some(&value[..i]),
            _ => {}
        }
    }
    (depth == 0 && !value.is_empty()).then_some(value)
}

/// Remove all whitespace and lowercase ASCII letters.
pub fn normalize_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
