//! Rules: named ordered-choice matchers with post-processing flags.

use std::fmt;

use crate::diagnostics::GramaryeError;
use crate::matcher::{Matcher, MatcherKind, MatchResult};
use crate::state::ParseState;
use crate::tree::ParseTree;

/// Rule-level flags, set by the `(...)` modifier list in a rule header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFlags {
    /// `hidden`: rule references do not name the produced node, so it is
    /// spliced into its parent.
    pub anonymous: bool,
    /// `fuse`: adjacent leaf children of the produced node are merged.
    pub fuse_children: bool,
    /// `collapse`: reserved; accepted and stored, no evaluation semantics.
    pub collapse: bool,
}

/// A named rule. The body is an ordered choice over its options; each
/// option is a sequence of matchers.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub flags: RuleFlags,
    matcher: Matcher,
}

impl Rule {
    pub fn new(name: impl Into<String>, flags: RuleFlags, options: Vec<Matcher>) -> Self {
        Self {
            name: name.into(),
            flags,
            matcher: Matcher::choice(options),
        }
    }

    pub fn options(&self) -> &[Matcher] {
        match &self.matcher.kind {
            MatcherKind::Choice(options) => options,
            _ => unreachable!("rule body is always a choice"),
        }
    }

    /// Evaluates the rule body, then applies the fuse post-pass when the
    /// rule carries the flag. Naming of the produced node is the caller's
    /// concern (rule references and the top-level entry point).
    pub fn eval(&self, state: &mut ParseState, index: usize) -> Result<MatchResult, GramaryeError> {
        let (mut tree, index) = self.matcher.eval(state, index)?;
        if self.flags.fuse_children {
            if let Some(node) = tree.as_mut().and_then(ParseTree::as_node_mut) {
                node.fuse_leaves();
            }
        }
        Ok((tree, index))
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        let mut modifiers = Vec::new();
        if self.flags.anonymous {
            modifiers.push("hidden");
        }
        if self.flags.fuse_children {
            modifiers.push("fuse");
        }
        if self.flags.collapse {
            modifiers.push("collapse");
        }
        if !modifiers.is_empty() {
            write!(f, "({})", modifiers.join(" "))?;
        }
        write!(f, ": ")?;

        for (i, option) in self.options().iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            // Top-level option sequences render without the surrounding
            // parentheses so the output reads like the grammar source.
            match &option.kind {
                MatcherKind::Sequence(children)
                    if option.flags == Default::default()
                        && option.count_min == 1
                        && option.count_max == Some(1)
                        && option.match_repl.is_none()
                        && option.actions.is_empty() =>
                {
                    let rendered: Vec<String> =
                        children.iter().map(|m| m.to_string()).collect();
                    write!(f, "{}", rendered.join(" "))?;
                }
                _ => write!(f, "{option}")?,
            }
        }
        write!(f, ";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BufferSink, RuleTable};

    #[test]
    fn fuse_flag_merges_leaf_runs_in_the_rule_result() {
        let rule = Rule::new(
            "Word",
            RuleFlags {
                fuse_children: true,
                ..Default::default()
            },
            vec![Matcher::sequence(vec![Matcher::range("a", "z").plus()])],
        );

        let rules = RuleTable::new();
        let mut sink = BufferSink::default();
        let mut state = ParseState::new("abc", "test.txt", &rules, &mut sink);
        let (tree, index) = rule.eval(&mut state, 0).unwrap();
        assert_eq!(index, 3);
        let tree = tree.unwrap();
        let node = tree.as_node().unwrap();
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].as_leaf().unwrap().value, "abc");
    }

    #[test]
    fn display_renders_header_options_and_terminator() {
        let rule = Rule::new(
            "Digit",
            RuleFlags::default(),
            vec![Matcher::sequence(vec![Matcher::range("0", "9")])],
        );
        assert_eq!(rule.to_string(), "Digit: '09';");

        let hidden = Rule::new(
            "Ws",
            RuleFlags {
                anonymous: true,
                fuse_children: true,
                ..Default::default()
            },
            vec![
                Matcher::sequence(vec![Matcher::exact(" ")]),
                Matcher::sequence(vec![Matcher::exact("\t")]),
            ],
        );
        assert_eq!(hidden.to_string(), "Ws(hidden fuse): \" \" | \"\\t\";");
    }
}
