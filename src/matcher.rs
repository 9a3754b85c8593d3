//! The matcher engine: a closed set of matcher variants inside a shared
//! modifier envelope, evaluated by one outer routine.
//!
//! Every matcher is invoked as `eval(state, index)` and yields a
//! `(tree, new_index)` pair where a `None` tree signals a silent parse
//! mismatch. Counting, inversion, look-ahead, omission, actions, and match
//! replacement are implemented exactly once, in the envelope; the variants
//! only supply `match_impl`.

use std::fmt;

use crate::action::{Action, TRIGGER_ON_FAIL, TRIGGER_ON_MATCH};
use crate::diagnostics::{ErrorKind, GramaryeError};
use crate::escape::escape_string;
use crate::state::ParseState;
use crate::tree::{ParseTree, ParseTreeNode};

/// Result of one matcher evaluation: the produced tree (None on mismatch)
/// and the input index to continue from.
pub type MatchResult = (Option<ParseTree>, usize);

/// Shared matcher flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatcherFlags {
    pub invert: bool,
    pub look_ahead: bool,
    /// Reserved. Evaluating a matcher with this flag set is an error.
    pub look_behind: bool,
    pub omit_match: bool,
}

/// Replacement applied to a successful match before it is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchReplacement {
    /// Rename the produced node (leaves are unchanged).
    Identifier(String),
    /// Replace the tree with a zero-width synthesized leaf.
    Literal(String),
    /// Replace the tree with a zero-width leaf holding the k-th-from-top
    /// entry of a named stack (empty string when out of range).
    Stack { name: String, index: usize },
}

/// Actions grouped by trigger, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSet {
    pub on_match: Vec<Action>,
    pub on_fail: Vec<Action>,
}

impl ActionSet {
    pub fn is_empty(&self) -> bool {
        self.on_match.is_empty() && self.on_fail.is_empty()
    }
}

/// The matcher variants.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherKind {
    /// `.` — any single byte.
    AnyChar,
    /// `(...)` — all children in order.
    Sequence(Vec<Matcher>),
    /// `[...]` — first child that matches.
    Choice(Vec<Matcher>),
    /// `'ab'` — one byte within an inclusive range, compared lexically.
    Range { first: String, last: String },
    /// `"..."` — an exact string.
    Exact(String),
    /// A reference to a named rule, resolved at evaluation time.
    RuleRef(String),
    /// `:name.k:` — the k-th-from-top entry of a named stack, matched
    /// literally.
    StackRef { stack: String, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    pub kind: MatcherKind,
    pub flags: MatcherFlags,
    pub count_min: usize,
    /// `None` means unbounded.
    pub count_max: Option<usize>,
    pub match_repl: Option<MatchReplacement>,
    pub actions: ActionSet,
}

impl Matcher {
    pub fn new(kind: MatcherKind) -> Self {
        Self {
            kind,
            flags: MatcherFlags::default(),
            count_min: 1,
            count_max: Some(1),
            match_repl: None,
            actions: ActionSet::default(),
        }
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    pub fn any_char() -> Self {
        Self::new(MatcherKind::AnyChar)
    }

    pub fn sequence(children: Vec<Matcher>) -> Self {
        Self::new(MatcherKind::Sequence(children))
    }

    pub fn choice(children: Vec<Matcher>) -> Self {
        Self::new(MatcherKind::Choice(children))
    }

    pub fn range(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self::new(MatcherKind::Range {
            first: first.into(),
            last: last.into(),
        })
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Self::new(MatcherKind::Exact(value.into()))
    }

    pub fn rule(name: impl Into<String>) -> Self {
        Self::new(MatcherKind::RuleRef(name.into()))
    }

    pub fn stack(name: impl Into<String>, index: usize) -> Self {
        Self::new(MatcherKind::StackRef {
            stack: name.into(),
            index,
        })
    }

    // ------------------------------------------------------------------
    // Builder-style modifiers
    // ------------------------------------------------------------------

    pub fn optional(mut self) -> Self {
        self.count_min = 0;
        self.count_max = Some(1);
        self
    }

    pub fn star(mut self) -> Self {
        self.count_min = 0;
        self.count_max = None;
        self
    }

    pub fn plus(mut self) -> Self {
        self.count_min = 1;
        self.count_max = None;
        self
    }

    pub fn counted(mut self, min: usize, max: Option<usize>) -> Self {
        self.count_min = min;
        self.count_max = max;
        self
    }

    pub fn invert(mut self) -> Self {
        self.flags.invert = true;
        self
    }

    pub fn look_ahead(mut self) -> Self {
        self.flags.look_ahead = true;
        self
    }

    pub fn omit(mut self) -> Self {
        self.flags.omit_match = true;
        self
    }

    pub fn replace(mut self, repl: MatchReplacement) -> Self {
        self.match_repl = Some(repl);
        self
    }

    /// Shorthand for an Identifier replacement, used for zero-width named
    /// marker nodes like `()->FormatHex`.
    pub fn replace_name(self, name: impl Into<String>) -> Self {
        self.replace(MatchReplacement::Identifier(name.into()))
    }

    pub fn on_match(mut self, action: Action) -> Self {
        self.actions.on_match.push(action);
        self
    }

    pub fn on_fail(mut self, action: Action) -> Self {
        self.actions.on_fail.push(action);
        self
    }

    pub fn add_action(&mut self, trigger_on_match: bool, action: Action) {
        if trigger_on_match {
            self.actions.on_match.push(action);
        } else {
            self.actions.on_fail.push(action);
        }
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// The shared outer routine. Applies counting, inversion, omission,
    /// actions, look-ahead, and match replacement uniformly around the
    /// variant-specific `match_impl`.
    pub fn eval(&self, state: &mut ParseState, index: usize) -> Result<MatchResult, GramaryeError> {
        if self.flags.look_behind {
            return Err(state.error_at(ErrorKind::LookBehindUnsupported, index));
        }

        let index_old = index;
        let mut index = index;
        let checkpoint = state.checkpoint();
        let mut base = ParseTreeNode::new(state.position_at(index_old));
        let mut match_count = 0usize;

        loop {
            let (mut sub_tree, mut sub_index) = self.match_impl(state, index)?;
            if self.flags.invert {
                (sub_tree, sub_index) = apply_invert(state, index, sub_tree);
            }
            index = sub_index;

            let Some(sub) = sub_tree else { break };
            match_count += 1;
            base.add_child(sub, self.flags.omit_match);

            if let Some(max) = self.count_max {
                if match_count >= max {
                    break;
                }
            }
        }

        if match_count < self.count_min {
            // onFail actions observe the stacks as the failing sub-match
            // left them; the checkpoint is restored afterwards.
            self.run_actions(&self.actions.on_fail, None, state, index_old)?;
            state.restore(&checkpoint);
            return Ok((None, index_old));
        }

        state.bump_farthest(index);

        if self.flags.look_ahead {
            index = index_old;
        }

        let mut tree = ParseTree::Node(base);
        self.run_actions(&self.actions.on_match, Some(&tree), state, index_old)?;

        if let Some(repl) = &self.match_repl {
            tree = apply_replacement(repl, tree, state, index_old);
        }

        Ok((Some(tree), index))
    }

    fn match_impl(
        &self,
        state: &mut ParseState,
        index: usize,
    ) -> Result<MatchResult, GramaryeError> {
        match &self.kind {
            MatcherKind::AnyChar => {
                if state.eof(index) {
                    return Ok((None, index));
                }
                let value = state.slice(index, index + 1);
                Ok((
                    Some(ParseTree::leaf(
                        value,
                        state.position_at(index),
                        state.position_at(index + 1),
                    )),
                    index + 1,
                ))
            }

            MatcherKind::Exact(value) => {
                if !state.starts_with(value, index) {
                    return Ok((None, index));
                }
                let next = index + value.len();
                Ok((
                    Some(ParseTree::leaf(
                        value.clone(),
                        state.position_at(index),
                        state.position_at(next),
                    )),
                    next,
                ))
            }

            MatcherKind::Range { first, last } => {
                if state.eof(index) {
                    return Ok((None, index));
                }
                let value = state.slice(index, index + 1);
                if value.as_str() < first.as_str() || value.as_str() > last.as_str() {
                    return Ok((None, index));
                }
                Ok((
                    Some(ParseTree::leaf(
                        value,
                        state.position_at(index),
                        state.position_at(index + 1),
                    )),
                    index + 1,
                ))
            }

            MatcherKind::Sequence(children) => {
                let index_old = index;
                let mut index = index;
                let mut collected = Vec::with_capacity(children.len());
                for child in children {
                    let (tree, next) = child.eval(state, index)?;
                    let Some(tree) = tree else {
                        return Ok((None, index_old));
                    };
                    collected.push(tree);
                    index = next;
                }
                let mut node = ParseTreeNode::new(state.position_at(index_old));
                for child in collected {
                    node.add_child(child, self.flags.omit_match);
                }
                Ok((Some(ParseTree::Node(node)), index))
            }

            MatcherKind::Choice(children) => {
                for child in children {
                    let (tree, next) = child.eval(state, index)?;
                    if tree.is_some() {
                        return Ok((tree, next));
                    }
                }
                Ok((None, index))
            }

            MatcherKind::RuleRef(name) => {
                let Some(rule) = state.get_rule(name) else {
                    return Err(
                        state.error_at(ErrorKind::RuleNotFound { name: name.clone() }, index)
                    );
                };
                let (mut tree, next) = rule.eval(state, index)?;
                if !rule.flags.anonymous {
                    if let Some(node) = tree.as_mut().and_then(ParseTree::as_node_mut) {
                        node.set_name(name);
                    }
                }
                Ok((tree, next))
            }

            MatcherKind::StackRef {
                stack,
                index: offset,
            } => {
                let value = state.stack_value(stack, *offset);
                if !state.starts_with(&value, index) {
                    return Ok((None, index));
                }
                let next = index + value.len();
                Ok((
                    Some(ParseTree::leaf(
                        value,
                        state.position_at(index),
                        state.position_at(next),
                    )),
                    next,
                ))
            }
        }
    }

    fn run_actions(
        &self,
        actions: &[Action],
        tree: Option<&ParseTree>,
        state: &mut ParseState,
        index: usize,
    ) -> Result<(), GramaryeError> {
        for action in actions {
            action.run(tree, state, index)?;
        }
        Ok(())
    }
}

/// Inversion: a mismatch becomes a single-byte leaf (unless at EOF, where
/// it stays a mismatch); a match becomes a mismatch at the original index.
fn apply_invert(state: &ParseState, index: usize, tree: Option<ParseTree>) -> MatchResult {
    match tree {
        None if !state.eof(index) => {
            let value = state.slice(index, index + 1);
            (
                Some(ParseTree::leaf(
                    value,
                    state.position_at(index),
                    state.position_at(index + 1),
                )),
                index + 1,
            )
        }
        None => (None, index),
        Some(_) => (None, index),
    }
}

fn apply_replacement(
    repl: &MatchReplacement,
    tree: ParseTree,
    state: &ParseState,
    index_old: usize,
) -> ParseTree {
    match repl {
        MatchReplacement::Literal(value) => {
            let pos = state.position_at(index_old);
            ParseTree::leaf(value.clone(), pos, pos)
        }
        MatchReplacement::Identifier(name) => {
            let mut tree = tree;
            if let Some(node) = tree.as_node_mut() {
                node.set_name(name);
            }
            tree
        }
        MatchReplacement::Stack {
            name,
            index: offset,
        } => {
            let pos = state.position_at(index_old);
            ParseTree::leaf(state.stack_value(name, *offset), pos, pos)
        }
    }
}

// ----------------------------------------------------------------------
// Display: renders a matcher back to grammar syntax.
// ----------------------------------------------------------------------

impl Matcher {
    fn kind_to_string(&self) -> String {
        match &self.kind {
            MatcherKind::AnyChar => ".".to_string(),
            MatcherKind::Sequence(children) => {
                if children.len() == 1 {
                    children[0].to_string()
                } else {
                    let inner: Vec<String> = children.iter().map(Matcher::to_string).collect();
                    format!("({})", inner.join(" "))
                }
            }
            MatcherKind::Choice(children) => {
                if children.len() == 1 {
                    children[0].to_string()
                } else {
                    let inner: Vec<String> = children.iter().map(Matcher::to_string).collect();
                    format!("[{}]", inner.join(" "))
                }
            }
            MatcherKind::Range { first, last } => {
                format!("'{}{}'", escape_string(first), escape_string(last))
            }
            MatcherKind::Exact(value) => format!("\"{}\"", escape_string(value)),
            MatcherKind::RuleRef(name) => name.clone(),
            MatcherKind::StackRef {
                stack,
                index,
            } => format!(":{stack}.{index}:"),
        }
    }

    fn count_to_string(&self) -> String {
        match (self.count_min, self.count_max) {
            (1, Some(1)) => String::new(),
            (0, Some(1)) => "?".to_string(),
            (0, None) => "*".to_string(),
            (1, None) => "+".to_string(),
            (min, None) => format!("#>{}", min - 1),
            (0, Some(max)) => format!("#<{}", max + 1),
            (min, Some(max)) if min == max => format!("#{min}"),
            (min, Some(max)) => format!("#{min}-{max}"),
        }
    }

    fn modifiers_to_string(&self) -> String {
        let mut out = self.count_to_string();
        if self.flags.look_ahead {
            out.push('~');
        }
        if self.flags.omit_match {
            out.push('_');
        }
        match &self.match_repl {
            None => {}
            Some(MatchReplacement::Identifier(name)) => out.push_str(&format!("->{name}")),
            Some(MatchReplacement::Literal(value)) => {
                out.push_str(&format!("->\"{}\"", escape_string(value)))
            }
            Some(MatchReplacement::Stack {
                name,
                index,
            }) => out.push_str(&format!("->:{name}.{index}:")),
        }
        out
    }

    fn actions_to_string(&self) -> String {
        if self.actions.is_empty() {
            return String::new();
        }
        let mut triggers = Vec::new();
        for (name, actions) in [
            (TRIGGER_ON_MATCH, &self.actions.on_match),
            (TRIGGER_ON_FAIL, &self.actions.on_fail),
        ] {
            if actions.is_empty() {
                continue;
            }
            let rendered: Vec<String> = actions.iter().map(Action::to_string).collect();
            triggers.push(format!("{name}:[{}]", rendered.join(", ")));
        }
        format!("{{{}}}", triggers.join(", "))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.invert {
            write!(f, "!")?;
        }
        write!(
            f,
            "{}{}{}",
            self.kind_to_string(),
            self.modifiers_to_string(),
            self.actions_to_string()
        )
    }
}
