//! Grammars: the rule table, top-level application, and the loader that
//! materializes rules from a parsed grammar source.
//!
//! Loading is self-hosted: the textual grammar syntax is parsed by the
//! hand-built internal grammar (see `bootstrap`), and the resulting parse
//! tree is walked here to build the user's rules.

use std::fmt;
use std::fs;
use std::path::Path;

use miette::SourceSpan;

use crate::action::{Action, ActionArg, ActionKind, TRIGGER_ON_FAIL, TRIGGER_ON_MATCH};
use crate::bootstrap;
use crate::diagnostics::{ErrorKind, GramaryeError, SourceContext};
use crate::escape::decode_escape;
use crate::matcher::{Matcher, MatchReplacement};
use crate::rule::{Rule, RuleFlags};
use crate::state::{MessageSink, ParseState, RuleTable, StdoutSink};
use crate::tree::{ParseTree, ParseTreeNode, Position};

/// Result of applying a grammar to input: the tree (None on mismatch) and
/// the end position derived from the farthest-match cursor — a "best
/// attempt" pointer on failure, the end of the match on full success.
#[derive(Debug)]
pub struct ParseOutcome {
    pub tree: Option<ParseTree>,
    pub end_position: Position,
}

/// A loaded grammar: an immutable name → rule map. Safe to share across
/// parses once constructed.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rules: RuleTable,
    filename: String,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a grammar from rules known to have distinct names. Used by
    /// the bootstrap grammar, which is correct by construction.
    pub(crate) fn from_rules(filename: &str, rules: Vec<Rule>) -> Self {
        let mut table = RuleTable::new();
        for rule in rules {
            table.insert(rule.name.clone(), rule);
        }
        Self {
            rules: table,
            filename: filename.to_string(),
        }
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), GramaryeError> {
        if self.rules.contains_key(&rule.name) {
            return Err(GramaryeError::unlocated(
                ErrorKind::DuplicateRule {
                    name: rule.name.clone(),
                },
                "load",
            ));
        }
        self.rules.insert(rule.name.clone(), rule);
        Ok(())
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    // ------------------------------------------------------------------
    // Application
    // ------------------------------------------------------------------

    /// Applies the named entry rule to `text`, reporting messages to
    /// stdout. See [`Grammar::apply_to_with_sink`].
    pub fn apply_to(
        &self,
        text: &str,
        rule_name: &str,
        filename: &str,
    ) -> Result<ParseOutcome, GramaryeError> {
        let mut sink = StdoutSink;
        self.apply_to_with_sink(text, rule_name, filename, &mut sink)
    }

    /// Applies the named entry rule to `text` from index 0.
    ///
    /// The outcome's end position is taken from the farthest-match cursor,
    /// not the final cursor. After a successful parse, any non-empty
    /// auxiliary stack is a post-condition failure (unbalanced push/pop in
    /// the grammar).
    pub fn apply_to_with_sink(
        &self,
        text: &str,
        rule_name: &str,
        filename: &str,
        sink: &mut dyn MessageSink,
    ) -> Result<ParseOutcome, GramaryeError> {
        let Some(rule) = self.rules.get(rule_name) else {
            let source = SourceContext::from_file(filename, text);
            return Err(GramaryeError::new(
                ErrorKind::RuleNotFound {
                    name: rule_name.to_string(),
                },
                &source,
                SourceSpan::from(0..0),
                "parse",
            ));
        };

        let mut state = ParseState::new(text, filename, &self.rules, sink);
        let (mut tree, _) = rule.eval(&mut state, 0)?;
        let end_position = state.position_at(state.farthest_match_index());

        if let Some(node) = tree.as_mut().and_then(ParseTree::as_node_mut) {
            node.set_name(rule_name);
        }

        if !state.stacks_are_empty() {
            return Err(state.error_at(
                ErrorKind::StacksNotEmpty {
                    dump: state.stack_dump(),
                },
                end_position.index,
            ));
        }

        Ok(ParseOutcome { tree, end_position })
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Grammar, GramaryeError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            GramaryeError::unlocated(
                ErrorKind::Io {
                    detail: format!("failed to read '{}': {e}", path.display()),
                },
                "load",
            )
        })?;
        Self::load_from_text(&text, &path.display().to_string())
    }

    /// Parses grammar source with the internal grammar and materializes
    /// the user's rules from the resulting tree. The whole text must be
    /// consumed; otherwise the farthest position is reported.
    pub fn load_from_text(text: &str, filename: &str) -> Result<Grammar, GramaryeError> {
        let internal = bootstrap::internal_grammar();
        let outcome = internal.apply_to(text, "Grammar", filename)?;

        let complete =
            outcome.tree.is_some() && outcome.end_position.index >= text.len();
        if !complete {
            let source = SourceContext::from_file(filename, text);
            let at = outcome.end_position.index;
            let span = SourceSpan::from(at..(at + 1).min(text.len()).max(at));
            return Err(GramaryeError::new(
                ErrorKind::IncompleteGrammar,
                &source,
                span,
                "load",
            )
            .with_help(format!(
                "parsing of the grammar source stopped at {}:{}:{}",
                filename, outcome.end_position.line, outcome.end_position.column
            )));
        }

        let tree = outcome.tree.unwrap_or_else(|| {
            // `complete` guarantees the tree exists.
            unreachable!("complete parse without a tree")
        });

        let loader = GrammarLoader::new(text, filename);
        let rules = loader.load(&tree)?;
        Ok(Grammar {
            rules,
            filename: filename.to_string(),
        })
    }
}

/// `Display` renders the grammar back to loadable textual syntax, one rule
/// per line.
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in self.rules.values() {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Tree walk: grammar parse tree → rules
// ----------------------------------------------------------------------

struct GrammarLoader {
    source: SourceContext,
}

impl GrammarLoader {
    fn new(text: &str, filename: &str) -> Self {
        Self {
            source: SourceContext::from_file(filename, text),
        }
    }

    fn load(&self, tree: &ParseTree) -> Result<RuleTable, GramaryeError> {
        let root = self.expect_node(tree)?;
        let mut rules = RuleTable::new();

        for child in &root.children {
            let node = self.expect_node(child)?;
            match node.name.as_str() {
                "RuleDefinition" => {
                    let rule = self.load_rule_definition(node)?;
                    if rules.contains_key(&rule.name) {
                        return Err(self.err(
                            ErrorKind::DuplicateRule {
                                name: rule.name.clone(),
                            },
                            node.pos_begin,
                        ));
                    }
                    rules.insert(rule.name.clone(), rule);
                }
                "Comment" => {}
                other => {
                    return Err(self.malformed(
                        format!("unexpected node '{other}' at grammar top level"),
                        node.pos_begin,
                    ))
                }
            }
        }

        Ok(rules)
    }

    fn load_rule_definition(&self, node: &ParseTreeNode) -> Result<Rule, GramaryeError> {
        let header = self.expect_named_child(node, 0, "RuleHeader")?;
        let body = self.expect_named_child(node, 1, "RuleBody")?;

        let (name, flags) = self.load_rule_header(header)?;
        let options = self.load_rule_body(body)?;
        Ok(Rule::new(name, flags, options))
    }

    fn load_rule_header(&self, node: &ParseTreeNode) -> Result<(String, RuleFlags), GramaryeError> {
        let name = self.identifier_text(self.child_at(node, 0)?)?;

        let mut flags = RuleFlags::default();
        for child in node.children.iter().skip(1) {
            let modifier = self.expect_node(child)?;
            if modifier.name != "RuleModifier" {
                return Err(self.malformed(
                    format!("unexpected node '{}' in rule header", modifier.name),
                    modifier.pos_begin,
                ));
            }
            let text = self.leaf_text(self.child_at(modifier, 0)?)?;
            match text.as_str() {
                "hidden" => flags.anonymous = true,
                "fuse" => flags.fuse_children = true,
                "collapse" => flags.collapse = true,
                other => {
                    return Err(self.err(
                        ErrorKind::UnknownRuleModifier {
                            name: other.to_string(),
                        },
                        modifier.pos_begin,
                    ))
                }
            }
        }

        Ok((name, flags))
    }

    fn load_rule_body(&self, node: &ParseTreeNode) -> Result<Vec<Matcher>, GramaryeError> {
        let mut options = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let option = self.expect_node(child)?;
            if option.name != "RuleOptionDefinition" {
                return Err(self.malformed(
                    format!("unexpected node '{}' in rule body", option.name),
                    option.pos_begin,
                ));
            }
            let mut matchers = Vec::with_capacity(option.children.len());
            for matcher_tree in &option.children {
                matchers.push(self.load_full_matcher(matcher_tree)?);
            }
            options.push(Matcher::sequence(matchers));
        }
        Ok(options)
    }

    fn load_full_matcher(&self, tree: &ParseTree) -> Result<Matcher, GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "FullMatcher" {
            return Err(self.malformed(
                format!("expected FullMatcher, found '{}'", node.name),
                node.pos_begin,
            ));
        }

        // A leading `!` parses as a prefix invert node; the remaining
        // children are the matcher, its modifiers, and its actions.
        let mut offset = 0;
        let prefix_invert = matches!(
            node.children.first().and_then(ParseTree::as_node),
            Some(first) if first.name == "MatcherModifierInvert"
        );
        if prefix_invert {
            offset = 1;
        }

        let mut matcher = self.load_matcher(self.child_at(node, offset)?)?;
        self.load_matcher_modifiers(&mut matcher, self.child_at(node, offset + 1)?)?;
        self.load_matcher_actions(&mut matcher, self.child_at(node, offset + 2)?)?;
        if prefix_invert {
            matcher.flags.invert = true;
        }
        Ok(matcher)
    }

    fn load_matcher(&self, tree: &ParseTree) -> Result<Matcher, GramaryeError> {
        let node = self.expect_node(tree)?;
        match node.name.as_str() {
            "MatchAnyChar" => Ok(Matcher::any_char()),
            "MatchAll" => {
                let mut children = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    children.push(self.load_full_matcher(child)?);
                }
                Ok(Matcher::sequence(children))
            }
            "MatchAny" => {
                let mut children = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    children.push(self.load_full_matcher(child)?);
                }
                Ok(Matcher::choice(children))
            }
            "MatchRange" => {
                let first = self.char_text(self.child_at(node, 0)?)?;
                let last = self.char_text(self.child_at(node, 1)?)?;
                Ok(Matcher::range(first, last))
            }
            "MatchExact" => {
                let value = self.decode_string(self.child_at(node, 0)?)?;
                Ok(Matcher::exact(value))
            }
            "MatchRule" => {
                let name = self.identifier_text(self.child_at(node, 0)?)?;
                Ok(Matcher::rule(name))
            }
            "MatchStack" => {
                let name = self.identifier_text(self.child_at(node, 0)?)?;
                let index = self.decode_integer(self.child_at(node, 1)?)?;
                Ok(Matcher::stack(name, index))
            }
            other => Err(self.err(
                ErrorKind::UnknownMatcherKind {
                    name: other.to_string(),
                },
                node.pos_begin,
            )),
        }
    }

    fn load_matcher_modifiers(
        &self,
        matcher: &mut Matcher,
        tree: &ParseTree,
    ) -> Result<(), GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "MatcherModifiers" {
            return Err(self.malformed(
                format!("expected MatcherModifiers, found '{}'", node.name),
                node.pos_begin,
            ));
        }

        for child in &node.children {
            let modifier = self.expect_node(child)?;
            match modifier.name.as_str() {
                "MatcherModifierInvert" => matcher.flags.invert = true,
                "MatcherModifierQuantifier" => {
                    self.load_quantifier(matcher, modifier)?;
                }
                "MatcherModifierLookAhead" => matcher.flags.look_ahead = true,
                "MatcherModifierOmitMatch" => matcher.flags.omit_match = true,
                "MatcherModifierReplaceMatch" => {
                    self.load_replacement(matcher, modifier)?;
                }
                other => {
                    return Err(self.malformed(
                        format!("unexpected node '{other}' in matcher modifiers"),
                        modifier.pos_begin,
                    ))
                }
            }
        }
        Ok(())
    }

    fn load_quantifier(
        &self,
        matcher: &mut Matcher,
        node: &ParseTreeNode,
    ) -> Result<(), GramaryeError> {
        let quantifier = self.expect_node(self.child_at(node, 0)?)?;
        match quantifier.name.as_str() {
            "QuantifierSymbolic" => {
                let symbol = self.leaf_text(self.child_at(quantifier, 0)?)?;
                match symbol.as_str() {
                    "?" => {
                        matcher.count_min = 0;
                        matcher.count_max = Some(1);
                    }
                    "*" => {
                        matcher.count_min = 0;
                        matcher.count_max = None;
                    }
                    "+" => {
                        matcher.count_min = 1;
                        matcher.count_max = None;
                    }
                    other => {
                        return Err(self.err(
                            ErrorKind::InvalidQuantifier {
                                detail: format!("unknown quantifier '{other}'"),
                            },
                            quantifier.pos_begin,
                        ))
                    }
                }
            }
            "QuantifierRange" => {
                let min = self.decode_integer(self.child_at(quantifier, 0)?)?;
                let max = self.decode_integer(self.child_at(quantifier, 1)?)?;
                if min > max {
                    return Err(self.err(
                        ErrorKind::InvalidQuantifier {
                            detail: format!("lower bound {min} exceeds upper bound {max}"),
                        },
                        quantifier.pos_begin,
                    ));
                }
                if max == 0 {
                    return Err(self.err(
                        ErrorKind::InvalidQuantifier {
                            detail: "quantifier range cannot be zero".to_string(),
                        },
                        quantifier.pos_begin,
                    ));
                }
                matcher.count_min = min;
                matcher.count_max = Some(max);
            }
            "QuantifierExact" => {
                let count = self.decode_integer(self.child_at(quantifier, 0)?)?;
                if count == 0 {
                    return Err(self.err(
                        ErrorKind::InvalidQuantifier {
                            detail: "quantifier range cannot be zero".to_string(),
                        },
                        quantifier.pos_begin,
                    ));
                }
                matcher.count_min = count;
                matcher.count_max = Some(count);
            }
            "QuantifierLowerBound" => {
                let bound = self.decode_integer(self.child_at(quantifier, 0)?)?;
                matcher.count_min = bound + 1;
                matcher.count_max = None;
            }
            "QuantifierUpperBound" => {
                let bound = self.decode_integer(self.child_at(quantifier, 0)?)?;
                if bound == 0 {
                    return Err(self.err(
                        ErrorKind::InvalidQuantifier {
                            detail: "quantifier range cannot be negative".to_string(),
                        },
                        quantifier.pos_begin,
                    ));
                }
                matcher.count_min = 0;
                matcher.count_max = Some(bound - 1);
            }
            other => {
                return Err(self.err(
                    ErrorKind::InvalidQuantifier {
                        detail: format!("unknown quantifier form '{other}'"),
                    },
                    quantifier.pos_begin,
                ))
            }
        }
        Ok(())
    }

    fn load_replacement(
        &self,
        matcher: &mut Matcher,
        node: &ParseTreeNode,
    ) -> Result<(), GramaryeError> {
        let target = self.expect_node(self.child_at(node, 0)?)?;
        let repl = match target.name.as_str() {
            "Identifier" => {
                MatchReplacement::Identifier(self.identifier_text(self.child_at(node, 0)?)?)
            }
            "String" => MatchReplacement::Literal(self.decode_string(self.child_at(node, 0)?)?),
            "MatchStack" => {
                let name = self.identifier_text(self.child_at(target, 0)?)?;
                let index = self.decode_integer(self.child_at(target, 1)?)?;
                MatchReplacement::Stack { name, index }
            }
            other => {
                return Err(self.malformed(
                    format!("unknown match replacement form '{other}'"),
                    target.pos_begin,
                ))
            }
        };
        matcher.match_repl = Some(repl);
        Ok(())
    }

    fn load_matcher_actions(
        &self,
        matcher: &mut Matcher,
        tree: &ParseTree,
    ) -> Result<(), GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "MatcherActions" {
            return Err(self.malformed(
                format!("expected MatcherActions, found '{}'", node.name),
                node.pos_begin,
            ));
        }

        for child in &node.children {
            let trigger = self.expect_node(child)?;
            if trigger.name != "MatcherTrigger" {
                return Err(self.malformed(
                    format!("unexpected node '{}' in matcher actions", trigger.name),
                    trigger.pos_begin,
                ));
            }

            let trigger_name = self.identifier_text(self.child_at(trigger, 0)?)?;
            let on_match = match trigger_name.as_str() {
                TRIGGER_ON_MATCH => true,
                TRIGGER_ON_FAIL => false,
                other => {
                    return Err(self.err(
                        ErrorKind::UnknownTrigger {
                            name: other.to_string(),
                        },
                        trigger.pos_begin,
                    ))
                }
            };

            let list = self.expect_node(self.child_at(trigger, 1)?)?;
            for action_tree in &list.children {
                let action = self.load_action(action_tree)?;
                matcher.add_action(on_match, action);
            }
        }
        Ok(())
    }

    fn load_action(&self, tree: &ParseTree) -> Result<Action, GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "MatcherAction" {
            return Err(self.malformed(
                format!("expected MatcherAction, found '{}'", node.name),
                node.pos_begin,
            ));
        }

        let name = self.identifier_text(self.child_at(node, 0)?)?;
        let Some(kind) = ActionKind::from_name(&name) else {
            return Err(self.err(ErrorKind::UnknownAction { name }, node.pos_begin));
        };

        let mut args = Vec::new();
        let arg_list = self.expect_node(self.child_at(node, 1)?)?;
        for arg_tree in &arg_list.children {
            let arg = self.expect_node(arg_tree)?;
            match arg.name.as_str() {
                "Identifier" => {
                    args.push(ActionArg::Identifier(self.identifier_text(arg_tree)?));
                }
                "String" => args.push(ActionArg::Literal(self.decode_string(arg_tree)?)),
                "MatchedText" => args.push(ActionArg::Match),
                other => {
                    return Err(self.malformed(
                        format!("unknown action argument form '{other}'"),
                        arg.pos_begin,
                    ))
                }
            }
        }

        Ok(Action::new(kind, args))
    }

    // ------------------------------------------------------------------
    // Terminal decoders
    // ------------------------------------------------------------------

    fn decode_string(&self, tree: &ParseTree) -> Result<String, GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "String" {
            return Err(self.malformed(
                format!("expected String, found '{}'", node.name),
                node.pos_begin,
            ));
        }

        let mut out = String::new();
        for child in &node.children {
            match child {
                ParseTree::Leaf(leaf) => out.push_str(&leaf.value),
                ParseTree::Node(escape) if escape.name == "EscapeSequence" => {
                    let body = self.leaf_text(self.child_at(escape, 0)?)?;
                    match decode_escape(&body) {
                        Some(c) => out.push(c),
                        None => {
                            return Err(self.err(
                                ErrorKind::UnknownEscape { body },
                                escape.pos_begin,
                            ))
                        }
                    }
                }
                ParseTree::Node(other) => {
                    return Err(self.malformed(
                        format!("unexpected node '{}' in string", other.name),
                        other.pos_begin,
                    ))
                }
            }
        }
        Ok(out)
    }

    fn decode_integer(&self, tree: &ParseTree) -> Result<usize, GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "Integer" {
            return Err(self.malformed(
                format!("expected Integer, found '{}'", node.name),
                node.pos_begin,
            ));
        }

        let digits = self.leaf_text(self.child_at(node, 0)?)?;
        let format = self.expect_node(self.child_at(node, 1)?)?;
        let base = match format.name.as_str() {
            "FormatBin" => 2,
            "FormatOct" => 8,
            "FormatDec" => 10,
            "FormatHex" => 16,
            other => {
                return Err(self.malformed(
                    format!("unknown integer base format '{other}'"),
                    format.pos_begin,
                ))
            }
        };

        usize::from_str_radix(&digits, base).map_err(|_| {
            self.err(
                ErrorKind::InvalidInteger {
                    digits: digits.clone(),
                    base,
                },
                node.pos_begin,
            )
        })
    }

    fn identifier_text(&self, tree: &ParseTree) -> Result<String, GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "Identifier" {
            return Err(self.malformed(
                format!("expected Identifier, found '{}'", node.name),
                node.pos_begin,
            ));
        }
        self.leaf_text(self.child_at(node, 0)?)
    }

    /// A `Char` node holds one leaf with the character it matched.
    fn char_text(&self, tree: &ParseTree) -> Result<String, GramaryeError> {
        let node = self.expect_node(tree)?;
        if node.name != "Char" {
            return Err(self.malformed(
                format!("expected Char, found '{}'", node.name),
                node.pos_begin,
            ));
        }
        self.leaf_text(self.child_at(node, 0)?)
    }

    fn leaf_text(&self, tree: &ParseTree) -> Result<String, GramaryeError> {
        match tree {
            ParseTree::Leaf(leaf) => Ok(leaf.value.clone()),
            ParseTree::Node(node) => Err(self.malformed(
                format!("expected leaf, found node '{}'", node.name),
                node.pos_begin,
            )),
        }
    }

    fn expect_named_child<'t>(
        &self,
        node: &'t ParseTreeNode,
        index: usize,
        name: &str,
    ) -> Result<&'t ParseTreeNode, GramaryeError> {
        let child = self.expect_node(self.child_at(node, index)?)?;
        if child.name != name {
            return Err(self.malformed(
                format!("expected {name}, found '{}'", child.name),
                child.pos_begin,
            ));
        }
        Ok(child)
    }

    fn child_at<'t>(
        &self,
        node: &'t ParseTreeNode,
        index: usize,
    ) -> Result<&'t ParseTree, GramaryeError> {
        node.children.get(index).ok_or_else(|| {
            self.malformed(
                format!("node '{}' is missing child {index}", node.name),
                node.pos_begin,
            )
        })
    }

    fn expect_node<'t>(&self, tree: &'t ParseTree) -> Result<&'t ParseTreeNode, GramaryeError> {
        match tree {
            ParseTree::Node(node) => Ok(node),
            ParseTree::Leaf(leaf) => Err(self.malformed(
                format!("expected node, found leaf \"{}\"", leaf.value),
                leaf.pos_begin,
            )),
        }
    }

    fn malformed(&self, detail: String, pos: Position) -> GramaryeError {
        self.err(ErrorKind::MalformedGrammarTree { detail }, pos)
    }

    fn err(&self, kind: ErrorKind, pos: Position) -> GramaryeError {
        let end = (pos.index + 1).min(self.source.content.len()).max(pos.index);
        GramaryeError::new(kind, &self.source, SourceSpan::from(pos.index..end), "load")
    }
}
