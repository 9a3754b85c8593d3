//! The command-line interface: mode dispatch for `verify`, `graph`, and
//! `render`, plus the file I/O glue around the engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use crate::cli::args::{Command, GramaryeArgs};
use crate::diagnostics::{print_error, ErrorKind, GramaryeError, SourceContext};
use crate::grammar::{Grammar, ParseOutcome};

pub mod args;
pub mod output;

/// The main entry point for the CLI. Exits with code 1 on any error.
pub fn run() {
    let args = GramaryeArgs::parse();

    let result = match args.command {
        Command::Verify { grammar, input } => handle_verify(&grammar, &input),
        Command::Graph {
            grammar,
            input,
            output,
        } => handle_graph(&grammar, &input, &output),
        Command::Render {
            grammar,
            input,
            output,
        } => handle_render(&grammar, &input, &output),
    };

    if let Err(e) = result {
        print_error(e);
        process::exit(1);
    }
}

/// Splits `<grammar_file>:<entry_point>` on the last colon.
fn split_entry(spec: &str) -> Result<(PathBuf, String), GramaryeError> {
    match spec.rsplit_once(':') {
        Some((file, entry)) if !file.is_empty() && !entry.is_empty() => {
            Ok((PathBuf::from(file), entry.to_string()))
        }
        _ => Err(GramaryeError::new(
            ErrorKind::Io {
                detail: format!("expected <grammar_file>:<entry_point>, got '{spec}'"),
            },
            &SourceContext::fallback(spec),
            miette::SourceSpan::from(0..spec.len()),
            "cli",
        )),
    }
}

fn read_file(path: &Path) -> Result<String, GramaryeError> {
    fs::read_to_string(path).map_err(|e| {
        GramaryeError::unlocated(
            ErrorKind::Io {
                detail: format!("failed to read '{}': {e}", path.display()),
            },
            "cli",
        )
    })
}

fn write_file(path: &Path, content: &str) -> Result<(), GramaryeError> {
    fs::write(path, content).map_err(|e| {
        GramaryeError::unlocated(
            ErrorKind::Io {
                detail: format!("failed to write '{}': {e}", path.display()),
            },
            "cli",
        )
    })
}

/// Loads the grammar, parses the input, and returns the outcome together
/// with the input text.
fn apply_grammar(spec: &str, input: &Path) -> Result<(ParseOutcome, String, String), GramaryeError> {
    let (grammar_file, entry_point) = split_entry(spec)?;

    output::print_stage("Reading input file");
    let text = read_file(input)?;

    output::print_stage("Loading grammar");
    let grammar = Grammar::load_from_file(&grammar_file)?;

    output::print_stage("Parsing text");
    let filename = input.display().to_string();
    let outcome = grammar.apply_to(&text, &entry_point, &filename)?;
    Ok((outcome, text, filename))
}

/// Exit nonzero unless the tree exists and the whole input was consumed.
fn handle_verify(spec: &str, input: &Path) -> Result<(), GramaryeError> {
    let (outcome, text, filename) = apply_grammar(spec, input)?;

    output::print_stage("Verifying result");
    if outcome.tree.is_none() || outcome.end_position.index < text.len() {
        let source = SourceContext::from_file(&filename, &text);
        let at = outcome.end_position.index;
        let span = miette::SourceSpan::from(at..(at + 1).min(text.len()).max(at));
        return Err(GramaryeError::new(ErrorKind::ParseIncomplete, &source, span, "cli")
            .with_help(format!(
                "parsing stopped at {}:{}:{}",
                filename, outcome.end_position.line, outcome.end_position.column
            )));
    }

    output::print_success("Done");
    Ok(())
}

/// Writes the verbose DOT rendering of the parse tree.
fn handle_graph(spec: &str, input: &Path, output_path: &Path) -> Result<(), GramaryeError> {
    let (outcome, text, filename) = apply_grammar(spec, input)?;

    let Some(tree) = outcome.tree else {
        let source = SourceContext::from_file(&filename, &text);
        let at = outcome.end_position.index;
        let span = miette::SourceSpan::from(at..(at + 1).min(text.len()).max(at));
        return Err(GramaryeError::new(
            ErrorKind::ParseIncomplete,
            &source,
            span,
            "cli",
        ));
    };

    output::print_stage("Writing output file");
    write_file(output_path, &tree.to_digraph(true))?;

    output::print_success("Done");
    Ok(())
}

/// Renders the parse tree to PDF by writing DOT to a temporary file and
/// invoking GraphViz.
fn handle_render(spec: &str, input: &Path, output_path: &Path) -> Result<(), GramaryeError> {
    let temp = tempfile::Builder::new()
        .prefix("gramarye-")
        .suffix(".dot")
        .tempfile()
        .map_err(|e| {
            GramaryeError::unlocated(
                ErrorKind::Io {
                    detail: format!("failed to create temporary file: {e}"),
                },
                "cli",
            )
        })?;

    handle_graph(spec, input, temp.path())?;

    output::print_stage("Rendering to output file");
    let status = process::Command::new("dot")
        .arg("-Tpdf")
        .arg("-o")
        .arg(output_path)
        .arg(temp.path())
        .status()
        .map_err(|e| {
            GramaryeError::unlocated(
                ErrorKind::RenderFailed {
                    detail: format!("failed to run dot: {e}"),
                },
                "cli",
            )
        })?;

    if !status.success() {
        return Err(GramaryeError::unlocated(
            ErrorKind::RenderFailed {
                detail: format!("dot exited with {status}"),
            },
            "cli",
        ));
    }

    output::print_success("Done");
    Ok(())
}
