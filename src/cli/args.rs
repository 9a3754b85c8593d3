//! Defines the command-line arguments and subcommands.
//!
//! Uses the `clap` derive API for a declarative, type-safe argument
//! structure. The grammar argument is `<grammar_file>:<entry_point>` and
//! splits on the last colon, so paths containing colons keep working.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "gramarye",
    version,
    about = "A grammar-driven parsing engine with parse-tree output."
)]
pub struct GramaryeArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse the input and fail unless the whole text was consumed.
    Verify {
        /// Grammar file and entry rule, as <grammar_file>:<entry_point>.
        #[arg(required = true)]
        grammar: String,
        /// The input file to parse.
        #[arg(required = true)]
        input: PathBuf,
    },
    /// Write the parse tree as a GraphViz DOT file.
    Graph {
        /// Grammar file and entry rule, as <grammar_file>:<entry_point>.
        #[arg(required = true)]
        grammar: String,
        /// The input file to parse.
        #[arg(required = true)]
        input: PathBuf,
        /// The DOT file to write.
        #[arg(required = true)]
        output: PathBuf,
    },
    /// Render the parse tree to PDF via GraphViz `dot`.
    Render {
        /// Grammar file and entry rule, as <grammar_file>:<entry_point>.
        #[arg(required = true)]
        grammar: String,
        /// The input file to parse.
        #[arg(required = true)]
        input: PathBuf,
        /// The PDF file to write.
        #[arg(required = true)]
        output: PathBuf,
    },
}
