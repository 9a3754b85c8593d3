//! Unified error handling for the engine.
//!
//! Every fatal condition — grammar load errors, action faults, parse
//! post-conditions, and CLI-boundary failures — flows through a single
//! [`GramaryeError`] carrying a `miette` source span, so the CLI can render
//! rich diagnostics with one code path.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

/// Source text a diagnostic points into, with a display name.
///
/// Real file content is preferred; the fallback form exists for errors that
/// have no source attached (I/O failures, external tool failures).
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Use only when real source cannot be obtained.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "<no source>".to_string(),
            content: context.to_string(),
        }
    }

    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

/// What went wrong. One variant per failure class the engine can produce.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Grammar load errors.
    #[error("unknown matcher kind '{name}'")]
    UnknownMatcherKind { name: String },
    #[error("unknown rule modifier '{name}'")]
    UnknownRuleModifier { name: String },
    #[error("rule '{name}' already defined")]
    DuplicateRule { name: String },
    #[error("unknown action '{name}'")]
    UnknownAction { name: String },
    #[error("unknown action trigger '{name}'")]
    UnknownTrigger { name: String },
    #[error("unknown escape sequence '\\{body}'")]
    UnknownEscape { body: String },
    #[error("invalid integer literal '{digits}' in base {base}")]
    InvalidInteger { digits: String, base: u32 },
    #[error("invalid quantifier: {detail}")]
    InvalidQuantifier { detail: String },
    #[error("malformed grammar tree: {detail}")]
    MalformedGrammarTree { detail: String },
    #[error("failed to parse grammar source past this point")]
    IncompleteGrammar,

    // Parse-time faults.
    #[error("rule '{name}' not found")]
    RuleNotFound { name: String },
    #[error("invalid action invocation: {detail}")]
    ActionFault { detail: String },
    #[error("cannot pop from empty stack '{stack}'")]
    EmptyStackPop { stack: String },
    #[error("{position}: FAIL: {message}")]
    ExplicitFail { position: String, message: String },
    #[error("look-behind matching is not implemented")]
    LookBehindUnsupported,

    // Tree path queries.
    #[error("no child matching segment '{segment}' in path '{path}'")]
    ChildNotFound { segment: String, path: String },
    #[error("malformed tree path '{path}'")]
    InvalidPath { path: String },
    #[error("expected a node, found {found}")]
    ExpectedNode { found: String },
    #[error("expected a leaf, found {found}")]
    ExpectedLeaf { found: String },

    // Post-conditions.
    #[error("stacks not empty after parsing:\n{dump}")]
    StacksNotEmpty { dump: String },

    // Outer-boundary failures.
    #[error("input could not be fully parsed")]
    ParseIncomplete,
    #[error("{detail}")]
    Io { detail: String },
    #[error("graph rendering failed: {detail}")]
    RenderFailed { detail: String },
}

impl ErrorKind {
    /// Stable suffix used to build the diagnostic code.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::UnknownMatcherKind { .. } => "unknown_matcher_kind",
            Self::UnknownRuleModifier { .. } => "unknown_rule_modifier",
            Self::DuplicateRule { .. } => "duplicate_rule",
            Self::UnknownAction { .. } => "unknown_action",
            Self::UnknownTrigger { .. } => "unknown_trigger",
            Self::UnknownEscape { .. } => "unknown_escape",
            Self::InvalidInteger { .. } => "invalid_integer",
            Self::InvalidQuantifier { .. } => "invalid_quantifier",
            Self::MalformedGrammarTree { .. } => "malformed_grammar_tree",
            Self::IncompleteGrammar => "incomplete_grammar",
            Self::RuleNotFound { .. } => "rule_not_found",
            Self::ActionFault { .. } => "action_fault",
            Self::EmptyStackPop { .. } => "empty_stack_pop",
            Self::ExplicitFail { .. } => "explicit_fail",
            Self::LookBehindUnsupported => "look_behind_unsupported",
            Self::ChildNotFound { .. } => "child_not_found",
            Self::InvalidPath { .. } => "invalid_path",
            Self::ExpectedNode { .. } => "expected_node",
            Self::ExpectedLeaf { .. } => "expected_leaf",
            Self::StacksNotEmpty { .. } => "stacks_not_empty",
            Self::ParseIncomplete => "parse_incomplete",
            Self::Io { .. } => "io",
            Self::RenderFailed { .. } => "render_failed",
        }
    }
}

/// Where the error happened.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// How to help.
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// The single error type: kind, location, and diagnostic enhancement.
#[derive(Debug)]
pub struct GramaryeError {
    pub kind: ErrorKind,
    pub source_info: SourceInfo,
    pub diagnostic_info: DiagnosticInfo,
}

impl GramaryeError {
    /// Builds an error anchored to `span` within `source`, tagging it with
    /// the pipeline phase ("load", "parse", "cli").
    pub fn new(kind: ErrorKind, source: &SourceContext, span: SourceSpan, phase: &str) -> Self {
        let error_code = format!("gramarye::{}::{}", phase, kind.code_suffix());
        Self {
            kind,
            source_info: SourceInfo {
                source: source.to_named_source(),
                primary_span: span,
                phase: phase.to_string(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }

    /// An error with no meaningful source location.
    pub fn unlocated(kind: ErrorKind, phase: &str) -> Self {
        Self::new(
            kind,
            &SourceContext::fallback(""),
            SourceSpan::from(0..0),
            phase,
        )
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.diagnostic_info.help = Some(help.into());
        self
    }
}

impl fmt::Display for GramaryeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for GramaryeError {}

impl Diagnostic for GramaryeError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl GramaryeError {
    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::UnknownMatcherKind { .. } => "unknown matcher".into(),
            ErrorKind::UnknownRuleModifier { .. } => "unknown modifier".into(),
            ErrorKind::DuplicateRule { .. } => "second definition here".into(),
            ErrorKind::UnknownAction { .. } => "unknown action".into(),
            ErrorKind::UnknownTrigger { .. } => "unknown trigger".into(),
            ErrorKind::UnknownEscape { .. } => "unknown escape".into(),
            ErrorKind::InvalidInteger { .. } => "invalid integer".into(),
            ErrorKind::InvalidQuantifier { .. } => "invalid quantifier".into(),
            ErrorKind::MalformedGrammarTree { .. } => "offending node".into(),
            ErrorKind::IncompleteGrammar => "parsing stopped here".into(),
            ErrorKind::RuleNotFound { .. } => "referenced here".into(),
            ErrorKind::ActionFault { .. } => "action invoked here".into(),
            ErrorKind::EmptyStackPop { .. } => "pop attempted here".into(),
            ErrorKind::ExplicitFail { .. } => "failure raised here".into(),
            ErrorKind::LookBehindUnsupported => "look-behind used here".into(),
            ErrorKind::ChildNotFound { .. } => "query target".into(),
            ErrorKind::InvalidPath { .. } => "query target".into(),
            ErrorKind::ExpectedNode { .. } => "query target".into(),
            ErrorKind::ExpectedLeaf { .. } => "query target".into(),
            ErrorKind::StacksNotEmpty { .. } => "parse ended here".into(),
            ErrorKind::ParseIncomplete => "farthest match".into(),
            ErrorKind::Io { .. } => "while handling this".into(),
            ErrorKind::RenderFailed { .. } => "render step".into(),
        }
    }
}

/// Renders an error with full miette diagnostics to stderr.
pub fn print_error(error: GramaryeError) {
    let report = miette::Report::new(error);
    eprintln!("{report:?}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_carry_phase_and_kind() {
        let source = SourceContext::from_file("g.peg", "Digit: '09';");
        let err = GramaryeError::new(
            ErrorKind::DuplicateRule {
                name: "Digit".into(),
            },
            &source,
            SourceSpan::from(0..5),
            "load",
        );
        assert_eq!(
            err.diagnostic_info.error_code,
            "gramarye::load::duplicate_rule"
        );
        assert_eq!(err.to_string(), "rule 'Digit' already defined");
    }

    #[test]
    fn explicit_fail_message_carries_position_and_text() {
        let err = GramaryeError::unlocated(
            ErrorKind::ExplicitFail {
                position: "input.txt:1:1".into(),
                message: "nope".into(),
            },
            "parse",
        );
        assert_eq!(err.to_string(), "input.txt:1:1: FAIL: nope");
    }
}
