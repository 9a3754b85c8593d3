//! Side-effect actions attached to matchers.
//!
//! Actions fire on the `onMatch` / `onFail` triggers of the matcher that
//! carries them. Arguments of kind `Match` are late-bound: they resolve to
//! the stringified matched subtree just before the action runs.

use std::fmt;

use crate::diagnostics::{ErrorKind, GramaryeError};
use crate::escape::escape_string;
use crate::state::ParseState;
use crate::tree::ParseTree;

pub const TRIGGER_ON_MATCH: &str = "onMatch";
pub const TRIGGER_ON_FAIL: &str = "onFail";

/// The closed set of action names a grammar may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Push,
    Pop,
    Message,
    Fail,
}

impl ActionKind {
    /// Resolves an action name from grammar source; unknown names are a
    /// load error at the caller.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "push" => Some(Self::Push),
            "pop" => Some(Self::Pop),
            "message" => Some(Self::Message),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Message => "message",
            Self::Fail => "fail",
        }
    }
}

/// An action argument as written in the grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionArg {
    Identifier(String),
    Literal(String),
    /// `_`: the matched text, resolved at execution time.
    Match,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub args: Vec<ActionArg>,
}

/// Argument after Match resolution: only identifiers and strings remain.
enum ResolvedArg {
    Identifier(String),
    Literal(String),
}

impl Action {
    pub fn new(kind: ActionKind, args: Vec<ActionArg>) -> Self {
        Self { kind, args }
    }

    /// Runs the action. `tree` is the matched subtree for `onMatch`
    /// triggers and `None` for `onFail`; a `Match` argument resolves to
    /// the empty string in the latter case.
    pub fn run(
        &self,
        tree: Option<&ParseTree>,
        state: &mut ParseState,
        index: usize,
    ) -> Result<(), GramaryeError> {
        let args: Vec<ResolvedArg> = self
            .args
            .iter()
            .map(|arg| match arg {
                ActionArg::Identifier(name) => ResolvedArg::Identifier(name.clone()),
                ActionArg::Literal(value) => ResolvedArg::Literal(value.clone()),
                ActionArg::Match => {
                    ResolvedArg::Literal(tree.map(ParseTree::to_text).unwrap_or_default())
                }
            })
            .collect();

        match self.kind {
            ActionKind::Push => self.run_push(args, state, index),
            ActionKind::Pop => self.run_pop(args, state, index),
            ActionKind::Message => self.run_message(args, state, index),
            ActionKind::Fail => self.run_fail(args, state, index),
        }
    }

    fn run_push(
        &self,
        args: Vec<ResolvedArg>,
        state: &mut ParseState,
        index: usize,
    ) -> Result<(), GramaryeError> {
        let [item, stack_name] = take_args::<2>(args, "push", state, index)?;
        let ResolvedArg::Literal(item) = item else {
            return Err(self.fault("push expects a string item argument", state, index));
        };
        let ResolvedArg::Identifier(stack_name) = stack_name else {
            return Err(self.fault("push expects a stack name argument", state, index));
        };
        state.push_value(&stack_name, item);
        Ok(())
    }

    fn run_pop(
        &self,
        args: Vec<ResolvedArg>,
        state: &mut ParseState,
        index: usize,
    ) -> Result<(), GramaryeError> {
        let [stack_name] = take_args::<1>(args, "pop", state, index)?;
        let ResolvedArg::Identifier(stack_name) = stack_name else {
            return Err(self.fault("pop expects a stack name argument", state, index));
        };
        state.pop_value(&stack_name, index)?;
        Ok(())
    }

    fn run_message(
        &self,
        args: Vec<ResolvedArg>,
        state: &mut ParseState,
        index: usize,
    ) -> Result<(), GramaryeError> {
        let [message] = take_args::<1>(args, "message", state, index)?;
        let ResolvedArg::Literal(message) = message else {
            return Err(self.fault("message expects a string argument", state, index));
        };
        state.message(&message, index);
        Ok(())
    }

    fn run_fail(
        &self,
        args: Vec<ResolvedArg>,
        state: &mut ParseState,
        index: usize,
    ) -> Result<(), GramaryeError> {
        let [message] = take_args::<1>(args, "fail", state, index)?;
        let ResolvedArg::Literal(message) = message else {
            return Err(self.fault("fail expects a string argument", state, index));
        };
        Err(state.error_at(
            ErrorKind::ExplicitFail {
                position: state.position_string(index),
                message,
            },
            index,
        ))
    }

    fn fault(&self, detail: &str, state: &ParseState, index: usize) -> GramaryeError {
        state.error_at(
            ErrorKind::ActionFault {
                detail: detail.to_string(),
            },
            index,
        )
    }
}

fn take_args<const N: usize>(
    args: Vec<ResolvedArg>,
    action: &str,
    state: &ParseState,
    index: usize,
) -> Result<[ResolvedArg; N], GramaryeError> {
    let got = args.len();
    args.try_into().map_err(|_| {
        state.error_at(
            ErrorKind::ActionFault {
                detail: format!("{action} expects {N} argument(s), got {got}"),
            },
            index,
        )
    })
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind.name())?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match arg {
                ActionArg::Identifier(name) => write!(f, "{name}")?,
                ActionArg::Literal(value) => write!(f, "\"{}\"", escape_string(value))?,
                ActionArg::Match => write!(f, "_")?,
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BufferSink, RuleTable};
    use crate::tree::{ParseTree, Position};

    #[test]
    fn push_resolves_match_argument_to_tree_text() {
        let rules = RuleTable::new();
        let mut sink = BufferSink::default();
        let mut state = ParseState::new("abc", "in.txt", &rules, &mut sink);
        let leaf = ParseTree::leaf("abc", Position::default(), Position::default());
        let action = Action::new(
            ActionKind::Push,
            vec![ActionArg::Match, ActionArg::Identifier("names".into())],
        );

        action.run(Some(&leaf), &mut state, 0).unwrap();
        assert_eq!(state.stack_contents("names"), vec!["abc".to_string()]);
    }

    #[test]
    fn match_argument_is_empty_without_a_tree() {
        let rules = RuleTable::new();
        let mut sink = BufferSink::default();
        let mut state = ParseState::new("abc", "in.txt", &rules, &mut sink);
        let action = Action::new(
            ActionKind::Push,
            vec![ActionArg::Match, ActionArg::Identifier("names".into())],
        );

        action.run(None, &mut state, 0).unwrap();
        assert_eq!(state.stack_contents("names"), vec![String::new()]);
    }

    #[test]
    fn wrong_arity_is_an_action_fault() {
        let rules = RuleTable::new();
        let mut sink = BufferSink::default();
        let mut state = ParseState::new("abc", "in.txt", &rules, &mut sink);
        let action = Action::new(ActionKind::Pop, vec![]);

        let err = action.run(None, &mut state, 0).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ActionFault { .. }));
    }

    #[test]
    fn fail_carries_position_and_message() {
        let rules = RuleTable::new();
        let mut sink = BufferSink::default();
        let mut state = ParseState::new("abc\ndef", "in.txt", &rules, &mut sink);
        let action = Action::new(ActionKind::Fail, vec![ActionArg::Literal("nope".into())]);

        let err = action.run(None, &mut state, 4).unwrap_err();
        assert_eq!(err.to_string(), "in.txt:2:1: FAIL: nope");
    }

    #[test]
    fn message_goes_to_the_sink_with_position_prefix() {
        let rules = RuleTable::new();
        let mut sink = BufferSink::default();
        {
            let mut state = ParseState::new("abc", "in.txt", &rules, &mut sink);
            let action =
                Action::new(ActionKind::Message, vec![ActionArg::Literal("hello".into())]);
            action.run(None, &mut state, 1).unwrap();
        }
        assert_eq!(sink.messages, vec!["in.txt:1:2: MSG: hello".to_string()]);
    }

    #[test]
    fn display_renders_grammar_syntax() {
        let action = Action::new(
            ActionKind::Push,
            vec![ActionArg::Match, ActionArg::Identifier("names".into())],
        );
        assert_eq!(action.to_string(), "push(_, names)");
    }
}
