use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use svg_removeoverlap::{Options, SkipFills, remove_overlaps};

#[derive(Parser)]
#[command(name = "svg-removeoverlap", version)]
#[command(about = "Merge the overlapping shapes of an SVG into a single path", long_about = None)]
struct Cli {
    /// Input SVG file
    input: PathBuf,

    /// Output SVG file
    output: PathBuf,

    /// Union shapes one at a time instead of all at once
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true",
          value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    sequential: bool,

    /// Merge white-filled shapes too
    #[arg(long = "keep_white", alias = "keep-white", action = ArgAction::Set,
          num_args = 0..=1, require_equals = true, default_value_t = false,
          default_missing_value = "true", value_parser = BoolishValueParser::new(),
          value_name = "BOOL")]
    keep_white: bool,

    /// Normalize the input (shapes, CSS, use references) before processing
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = true, default_missing_value = "true",
          value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    cairo: bool,

    /// Canonicalize the document into flat paths before filtering
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true",
          value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    picofy: bool,

    /// Print per-shape decisions and full error details
    #[arg(long, action = ArgAction::Set, num_args = 0..=1, require_equals = true,
          default_value_t = false, default_missing_value = "true",
          value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    verbose: bool,

    /// Fill to skip (repeatable); replaces the default white/transparent list
    #[arg(long = "skip_fill", alias = "skip-fill", value_name = "FILL")]
    skip_fill: Vec<String>,

    /// Precision for coordinates (decimal places)
    #[arg(long, default_value = "3")]
    precision: u8,

    /// Fill of the merged path
    #[arg(long, value_name = "COLOR")]
    fill: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        });
    }

    let mut options = Options {
        normalize: cli.cairo,
        canonicalize: cli.picofy,
        keep_white: cli.keep_white,
        verbose: cli.verbose,
        precision: cli.precision,
        fill: cli.fill,
        ..Options::default()
    };
    if !cli.skip_fill.is_empty() {
        options.skip_fills = SkipFills::new(&cli.skip_fill);
    }

    match remove_overlaps(&cli.input, &cli.output, &options, cli.sequential) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if cli.verbose {
                let mut source = e.source();
                while let Some(cause) = source {
                    eprintln!("  caused by: {}", cause);
                    source = cause.source();
                }
                eprintln!("{:#?}", e);
            }
            ExitCode::FAILURE
        }
    }
}

static LOGGER: SimpleLogger = SimpleLogger;
struct SimpleLogger;
impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let target = if !record.target().is_empty() {
                record.target()
            } else {
                record.module_path().unwrap_or_default()
            };

            let line = record.line().unwrap_or(0);

            match record.level() {
                log::Level::Error => eprintln!("Error (in {}:{}): {}", target, line, record.args()),
                log::Level::Warn => eprintln!("Warning (in {}:{}): {}", target, line, record.args()),
                log::Level::Info => eprintln!("Info (in {}:{}): {}", target, line, record.args()),
                log::Level::Debug => eprintln!("Debug (in {}:{}): {}", target, line, record.args()),
                log::Level::Trace => eprintln!("Trace (in {}:{}): {}", target, line, record.args()),
            }
        }
    }

    fn flush(&self) {}
}
