pub use crate::diagnostics::{print_error, ErrorKind, GramaryeError, SourceContext};
pub use crate::grammar::{Grammar, ParseOutcome};
pub use crate::matcher::{Matcher, MatcherFlags, MatcherKind, MatchReplacement};
pub use crate::rule::{Rule, RuleFlags};
pub use crate::state::{BufferSink, MessageSink, ParseState, StdoutSink};
pub use crate::tree::{ParseTree, ParseTreeLeaf, ParseTreeNode, Position};

pub mod action;
pub mod bootstrap;
pub mod cli;
pub mod diagnostics;
pub mod escape;
pub mod grammar;
pub mod matcher;
pub mod rule;
pub mod state;
pub mod tree;
