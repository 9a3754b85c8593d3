//! Handles user-facing status output for the CLI.
//!
//! Errors go to stderr through the miette report path in `diagnostics`;
//! this module only prints progress and success lines, colorized when the
//! terminal supports it.

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Prints a dim progress line for a pipeline stage.
pub fn print_stage(text: &str) {
    println!("{text}...");
}

/// Prints a bold green success line.
pub fn print_success(text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    println!("{text}");
    let _ = stdout.reset();
}
