//! SVG path data parsing, outline conversion and writing.
//!
//! SVG path syntax: https://www.w3.org/TR/SVG/paths.html
//!
//! Parsed commands keep their relative/absolute form. [`to_bez_path`] resolves
//! them into an absolute [`BezPath`] outline, which is what the union works on,
//! and [`write_bez_path`] turns an outline back into compact path data.

use kurbo::{Arc, BezPath, PathEl, Point, SvgArc, Vec2};

use crate::error::SvgError;

/// Tolerance used when approximating elliptical arcs with cubic curves.
const ARC_TOLERANCE: f64 = 0.01;

/// A parsed SVG path.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub commands: Vec<Command>,
}

/// A path command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// M/m - Move to
    MoveTo { rel: bool, x: f64, y: f64 },
    /// L/l - Line to
    LineTo { rel: bool, x: f64, y: f64 },
    /// H/h - Horizontal line to
    HorizontalTo { rel: bool, x: f64 },
    /// V/v - Vertical line to
    VerticalTo { rel: bool, y: f64 },
    /// C/c - Cubic bezier
    CurveTo {
        rel: bool,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        x: f64,
        y: f64,
    },
    /// S/s - Smooth cubic bezier
    SmoothCurveTo {
        rel: bool,
        x2: f64,
        y2: f64,
        x: f64,
        y: f64,
    },
    /// Q/q - Quadratic bezier
    QuadTo {
        rel: bool,
        x1: f64,
        y1: f64,
        x: f64,
        y: f64,
    },
    /// T/t - Smooth quadratic bezier
    SmoothQuadTo { rel: bool, x: f64, y: f64 },
    /// A/a - Arc
    Arc {
        rel: bool,
        rx: f64,
        ry: f64,
        x_axis_rotation: f64,
        large_arc: bool,
        sweep: bool,
        x: f64,
        y: f64,
    },
    /// Z/z - Close path
    ClosePath,
}

/// Parse SVG path data.
pub fn parse_path(d: &str) -> Result<Path, SvgError> {
    let mut parser = PathParser::new(d);
    parser.parse()
}

/// Control point remembered for the S/s and T/t shorthands.
#[derive(Clone, Copy)]
enum LastControl {
    None,
    Cubic(Point),
    Quad(Point),
}

/// Resolve parsed commands into an absolute outline.
pub fn to_bez_path(path: &Path) -> BezPath {
    let mut out = BezPath::new();
    let mut current = Point::ZERO;
    let mut start = Point::ZERO;
    let mut last = LastControl::None;
    let mut needs_move = true;

    for cmd in &path.commands {
        let origin = current;
        let abs = |rel: bool, x: f64, y: f64| {
            if rel {
                Point::new(origin.x + x, origin.y + y)
            } else {
                Point::new(x, y)
            }
        };

        if let Command::MoveTo { rel, x, y } = *cmd {
            current = abs(rel, x, y);
            start = current;
            out.move_to(current);
            needs_move = false;
            last = LastControl::None;
            continue;
        }
        if matches!(cmd, Command::ClosePath) {
            if !needs_move {
                out.close_path();
            }
            current = start;
            needs_move = true;
            last = LastControl::None;
            continue;
        }

        // Drawing after `z` starts a new subpath at the previous start point.
        if needs_move {
            out.move_to(current);
            start = current;
            needs_move = false;
        }

        match *cmd {
            Command::LineTo { rel, x, y } => {
                current = abs(rel, x, y);
                out.line_to(current);
                last = LastControl::None;
            }
            Command::HorizontalTo { rel, x } => {
                current = Point::new(if rel { origin.x + x } else { x }, origin.y);
                out.line_to(current);
                last = LastControl::None;
            }
            Command::VerticalTo { rel, y } => {
                current = Point::new(origin.x, if rel { origin.y + y } else { y });
                out.line_to(current);
                last = LastControl::None;
            }
            Command::CurveTo {
                rel,
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let c2 = abs(rel, x2, y2);
                current = abs(rel, x, y);
                out.curve_to(abs(rel, x1, y1), c2, current);
                last = LastControl::Cubic(c2);
            }
            Command::SmoothCurveTo { rel, x2, y2, x, y } => {
                let c1 = match last {
                    LastControl::Cubic(c) => reflect(c, origin),
                    _ => origin,
                };
                let c2 = abs(rel, x2, y2);
                current = abs(rel, x, y);
                out.curve_to(c1, c2, current);
                last = LastControl::Cubic(c2);
            }
            Command::QuadTo { rel, x1, y1, x, y } => {
                let c = abs(rel, x1, y1);
                current = abs(rel, x, y);
                out.quad_to(c, current);
                last = LastControl::Quad(c);
            }
            Command::SmoothQuadTo { rel, x, y } => {
                let c = match last {
                    LastControl::Quad(c) => reflect(c, origin),
                    _ => origin,
                };
                current = abs(rel, x, y);
                out.quad_to(c, current);
                last = LastControl::Quad(c);
            }
            Command::Arc {
                rel,
                rx,
                ry,
                x_axis_rotation,
                large_arc,
                sweep,
                x,
                y,
            } => {
                current = abs(rel, x, y);
                append_arc(
                    &mut out,
                    origin,
                    current,
                    Vec2::new(rx.abs(), ry.abs()),
                    x_axis_rotation,
                    large_arc,
                    sweep,
                );
                last = LastControl::None;
            }
            Command::MoveTo { .. } | Command::ClosePath => {}
        }
    }

    out
}

fn reflect(control: Point, around: Point) -> Point {
    around + (around - control)
}

/// Append an SVG elliptical arc (rotation in degrees) as cubic curves.
pub(crate) fn append_arc(
    out: &mut BezPath,
    from: Point,
    to: Point,
    radii: Vec2,
    x_rotation: f64,
    large_arc: bool,
    sweep: bool,
) {
    let svg_arc = SvgArc {
        from,
        to,
        radii,
        x_rotation: x_rotation.to_radians(),
        large_arc,
        sweep,
    };
    match Arc::from_svg_arc(&svg_arc) {
        Some(arc) => out.extend(arc.append_iter(ARC_TOLERANCE)),
        None => out.line_to(to),
    }
}

/// Convert an outline into absolute path commands.
pub fn from_bez_path(path: &BezPath) -> Path {
    let commands = path
        .elements()
        .iter()
        .map(|el| match *el {
            PathEl::MoveTo(p) => Command::MoveTo {
                rel: false,
                x: p.x,
                y: p.y,
            },
            PathEl::LineTo(p) => Command::LineTo {
                rel: false,
                x: p.x,
                y: p.y,
            },
            PathEl::QuadTo(c, p) => Command::QuadTo {
                rel: false,
                x1: c.x,
                y1: c.y,
                x: p.x,
                y: p.y,
            },
            PathEl::CurveTo(c1, c2, p) => Command::CurveTo {
                rel: false,
                x1: c1.x,
                y1: c1.y,
                x2: c2.x,
                y2: c2.y,
                x: p.x,
                y: p.y,
            },
            PathEl::ClosePath => Command::ClosePath,
        })
        .collect();
    Path { commands }
}

/// Write an outline as compact path data.
pub fn write_bez_path(path: &BezPath, precision: u8) -> String {
    serialize_path(&from_bez_path(path), precision)
}

/// Serialize path data with the given precision.
pub fn serialize_path(path: &Path, precision: u8) -> String {
    let mut out = String::new();
    let mut prev_cmd: Option<char> = None;

    for cmd in &path.commands {
        let (c, new_cmd) = match cmd {
            Command::MoveTo { rel, x, y } => {
                let c = if *rel { 'm' } else { 'M' };
                (format_cmd(c, prev_cmd, &[*x, *y], precision), c)
            }
            Command::LineTo { rel, x, y } => {
                let c = if *rel { 'l' } else { 'L' };
                (format_cmd(c, prev_cmd, &[*x, *y], precision), c)
            }
            Command::HorizontalTo { rel, x } => {
                let c = if *rel { 'h' } else { 'H' };
                (format_cmd(c, prev_cmd, &[*x], precision), c)
            }
            Command::VerticalTo { rel, y } => {
                let c = if *rel { 'v' } else { 'V' };
                (format_cmd(c, prev_cmd, &[*y], precision), c)
            }
            Command::CurveTo {
                rel,
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let c = if *rel { 'c' } else { 'C' };
                (
                    format_cmd(c, prev_cmd, &[*x1, *y1, *x2, *y2, *x, *y], precision),
                    c,
                )
            }
            Command::SmoothCurveTo { rel, x2, y2, x, y } => {
                let c = if *rel { 's' } else { 'S' };
                (format_cmd(c, prev_cmd, &[*x2, *y2, *x, *y], precision), c)
            }
            Command::QuadTo { rel, x1, y1, x, y } => {
                let c = if *rel { 'q' } else { 'Q' };
                (format_cmd(c, prev_cmd, &[*x1, *y1, *x, *y], precision), c)
            }
            Command::SmoothQuadTo { rel, x, y } => {
                let c = if *rel { 't' } else { 'T' };
                (format_cmd(c, prev_cmd, &[*x, *y], precision), c)
            }
            Command::Arc {
                rel,
                rx,
                ry,
                x_axis_rotation,
                large_arc,
                sweep,
                x,
                y,
            } => {
                let c = if *rel { 'a' } else { 'A' };
                let flags = [f64::from(u8::from(*large_arc)), f64::from(u8::from(*sweep))];
                let args = [*rx, *ry, *x_axis_rotation, flags[0], flags[1], *x, *y];
                (format_cmd(c, prev_cmd, &args, precision), c)
            }
            Command::ClosePath => ('z'.to_string(), 'z'),
        };
        push_separated(&mut out, &c);
        prev_cmd = Some(new_cmd);
    }

    out
}

fn format_cmd(cmd: char, prev_cmd: Option<char>, args: &[f64], precision: u8) -> String {
    let mut out = String::new();

    // Omit the letter when it repeats; coordinates after M/m continue as L/l.
    let needs_cmd = match prev_cmd {
        None => true,
        Some('M') if cmd == 'L' => false,
        Some('m') if cmd == 'l' => false,
        Some(prev) => prev != cmd,
    };

    if needs_cmd {
        out.push(cmd);
    }

    for arg in args {
        push_separated(&mut out, &format_number(*arg, precision));
    }

    out
}

/// Append `s`, adding a space only where two numbers would otherwise merge.
fn push_separated(out: &mut String, s: &str) {
    let ends_numeric = out.ends_with(|c: char| c.is_ascii_digit() || c == '.');
    let starts_numeric = s.starts_with(|c: char| c.is_ascii_digit() || c == '.');
    if ends_numeric && starts_numeric {
        out.push(' ');
    }
    out.push_str(s);
}

/// Format a number with the given precision, removing unnecessary zeros.
pub fn format_number(n: f64, precision: u8) -> String {
    let factor = 10f64.powi(precision as i32);
    let rounded = (n * factor).round() / factor;
    if rounded == 0.0 || !rounded.is_finite() {
        return "0".into();
    }

    let mut buf = ryu::Buffer::new();
    let s = buf.format_finite(rounded);
    let s = s.strip_suffix(".0").unwrap_or(s);

    // 0.5 -> .5
    if let Some(rest) = s.strip_prefix("0.") {
        format!(".{}", rest)
    } else if let Some(rest) = s.strip_prefix("-0.") {
        format!("-.{}", rest)
    } else {
        s.to_string()
    }
}

struct PathParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<Path, SvgError> {
        let mut commands = Vec::new();
        let mut last_cmd: Option<char> = None;

        self.skip_whitespace();

        while let Some(next) = self.peek() {
            let cmd = if next.is_ascii_alphabetic() {
                self.next();
                last_cmd = Some(next);
                next
            } else {
                // Implicit command: repeat the last one, M/m continue as L/l.
                match last_cmd {
                    Some('M') => 'L',
                    Some('m') => 'l',
                    Some('z' | 'Z') | None => {
                        return Err(SvgError::InvalidPath(format!(
                            "Expected command letter at offset {}",
                            self.pos
                        )));
                    }
                    Some(c) => c,
                }
            };

            commands.push(self.parse_command(cmd)?);
            self.skip_whitespace_and_comma();
        }

        Ok(Path { commands })
    }

    fn parse_command(&mut self, cmd: char) -> Result<Command, SvgError> {
        let rel = cmd.is_ascii_lowercase();

        match cmd.to_ascii_lowercase() {
            'm' => {
                let [x, y] = self.parse_numbers()?;
                Ok(Command::MoveTo { rel, x, y })
            }
            'l' => {
                let [x, y] = self.parse_numbers()?;
                Ok(Command::LineTo { rel, x, y })
            }
            'h' => {
                let x = self.parse_number()?;
                Ok(Command::HorizontalTo { rel, x })
            }
            'v' => {
                let y = self.parse_number()?;
                Ok(Command::VerticalTo { rel, y })
            }
            'c' => {
                let [x1, y1, x2, y2, x, y] = self.parse_numbers()?;
                Ok(Command::CurveTo {
                    rel,
                    x1,
                    y1,
                    x2,
                    y2,
                    x,
                    y,
                })
            }
            's' => {
                let [x2, y2, x, y] = self.parse_numbers()?;
                Ok(Command::SmoothCurveTo { rel, x2, y2, x, y })
            }
            'q' => {
                let [x1, y1, x, y] = self.parse_numbers()?;
                Ok(Command::QuadTo { rel, x1, y1, x, y })
            }
            't' => {
                let [x, y] = self.parse_numbers()?;
                Ok(Command::SmoothQuadTo { rel, x, y })
            }
            'a' => {
                let [rx, ry, x_axis_rotation] = self.parse_numbers()?;
                let large_arc = self.parse_flag()?;
                let sweep = self.parse_flag()?;
                let [x, y] = self.parse_numbers()?;
                Ok(Command::Arc {
                    rel,
                    rx,
                    ry,
                    x_axis_rotation,
                    large_arc,
                    sweep,
                    x,
                    y,
                })
            }
            'z' => Ok(Command::ClosePath),
            _ => Err(SvgError::InvalidPath(format!("Unknown command: {}", cmd))),
        }
    }

    fn parse_numbers<const N: usize>(&mut self) -> Result<[f64; N], SvgError> {
        let mut out = [0.0; N];
        for slot in &mut out {
            *slot = self.parse_number()?;
        }
        Ok(out)
    }

    fn parse_number(&mut self) -> Result<f64, SvgError> {
        self.skip_whitespace_and_comma();

        let start = self.pos;

        if matches!(self.peek(), Some('-' | '+')) {
            self.next();
        }
        self.skip_digits();
        if self.peek() == Some('.') {
            self.next();
            self.skip_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.next();
            if matches!(self.peek(), Some('-' | '+')) {
                self.next();
            }
            self.skip_digits();
        }

        let s = &self.input[start..self.pos];
        if s.is_empty() {
            return Err(SvgError::InvalidPath(format!(
                "Expected number at offset {}",
                start
            )));
        }

        s.parse()
            .map_err(|_| SvgError::InvalidPath(format!("Invalid number: {}", s)))
    }

    fn parse_flag(&mut self) -> Result<bool, SvgError> {
        self.skip_whitespace_and_comma();
        match self.next() {
            Some('0') => Ok(false),
            Some('1') => Ok(true),
            Some(c) => Err(SvgError::InvalidPath(format!(
                "Expected flag (0 or 1), got: {}",
                c
            ))),
            None => Err(SvgError::InvalidPath("Expected flag".into())),
        }
    }

    fn skip_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.next();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.next();
        }
    }

    fn skip_whitespace_and_comma(&mut self) {
        self.skip_whitespace();
        if self.peek() == Some(',') {
            self.next();
        }
        self.skip_whitespace();
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}
