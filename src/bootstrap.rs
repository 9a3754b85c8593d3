//! The hand-built internal grammar that parses user grammar files.
//!
//! Constructed programmatically to break the self-hosting circularity: the
//! loader applies this grammar to grammar source text and walks the
//! resulting tree to materialize the user's rules. The node names produced
//! here are the contract with the loader walk in `grammar.rs`.
//!
//! Hidden helper rules splice into their parents, so the trees the loader
//! sees contain only the named structure it expects: a `RuleDefinition`
//! holds a `RuleHeader` and a `RuleBody`, a `FullMatcher` holds the
//! matcher form plus `MatcherModifiers` and `MatcherActions`, and so on.

use crate::grammar::Grammar;
use crate::matcher::Matcher;
use crate::rule::{Rule, RuleFlags};

fn exact(value: &str) -> Matcher {
    Matcher::exact(value)
}

fn range(first: &str, last: &str) -> Matcher {
    Matcher::range(first, last)
}

fn seq(children: Vec<Matcher>) -> Matcher {
    Matcher::sequence(children)
}

fn choice(children: Vec<Matcher>) -> Matcher {
    Matcher::choice(children)
}

fn r(name: &str) -> Matcher {
    Matcher::rule(name)
}

/// A zero-width named marker node, e.g. the integer base tags.
fn marker(name: &str) -> Matcher {
    Matcher::sequence(vec![]).replace_name(name)
}

fn ws_char() -> Matcher {
    choice(vec![exact(" "), exact("\t"), exact("\r"), exact("\n")])
}

/// Optional whitespace, omitted from the tree.
fn ws_opt() -> Matcher {
    ws_char().star().omit()
}

/// Required whitespace, omitted from the tree.
fn ws_req() -> Matcher {
    ws_char().plus().omit()
}

fn alpha_char() -> Matcher {
    choice(vec![range("a", "z"), range("A", "Z")])
}

fn alnum_char() -> Matcher {
    choice(vec![range("a", "z"), range("A", "Z"), range("0", "9")])
}

fn hex_char() -> Matcher {
    choice(vec![range("0", "9"), range("a", "f"), range("A", "F")])
}

fn plain(name: &str, options: Vec<Matcher>) -> Rule {
    Rule::new(name, RuleFlags::default(), options)
}

fn hidden(name: &str, options: Vec<Matcher>) -> Rule {
    Rule::new(
        name,
        RuleFlags {
            anonymous: true,
            ..Default::default()
        },
        options,
    )
}

fn fused(name: &str, options: Vec<Matcher>) -> Rule {
    Rule::new(
        name,
        RuleFlags {
            fuse_children: true,
            ..Default::default()
        },
        options,
    )
}

fn hidden_fused(name: &str, options: Vec<Matcher>) -> Rule {
    Rule::new(
        name,
        RuleFlags {
            anonymous: true,
            fuse_children: true,
            ..Default::default()
        },
        options,
    )
}

/// Builds the internal grammar. The entry rule is `Grammar`.
pub fn internal_grammar() -> Grammar {
    let rules = vec![
        // Grammar := (RuleDefinition | Comment | ws)*
        plain(
            "Grammar",
            vec![seq(vec![choice(vec![
                r("RuleDefinition"),
                r("Comment"),
                ws_char().plus().omit(),
            ])
            .star()])],
        ),
        // Comment := '\' ...to end of line
        plain(
            "Comment",
            vec![seq(vec![
                exact("\\").omit(),
                exact("\n").invert().star().omit(),
                exact("\n").optional().omit(),
            ])],
        ),
        // RuleDefinition := RuleHeader ':' RuleBody ';'
        plain(
            "RuleDefinition",
            vec![seq(vec![
                r("RuleHeader"),
                ws_opt(),
                exact(":").omit(),
                ws_opt(),
                r("RuleBody"),
                ws_opt(),
                exact(";").omit(),
            ])],
        ),
        // RuleHeader := Identifier ('(' RuleModifier (ws RuleModifier)* ')')?
        plain(
            "RuleHeader",
            vec![seq(vec![
                r("Identifier"),
                r("RuleHeaderModifiers").optional(),
            ])],
        ),
        hidden(
            "RuleHeaderModifiers",
            vec![seq(vec![
                exact("(").omit(),
                ws_opt(),
                r("RuleModifier"),
                seq(vec![ws_req(), r("RuleModifier")]).star(),
                ws_opt(),
                exact(")").omit(),
            ])],
        ),
        plain("RuleModifier", vec![seq(vec![r("IdentifierChars")])]),
        plain("Identifier", vec![seq(vec![r("IdentifierChars")])]),
        hidden_fused(
            "IdentifierChars",
            vec![seq(vec![alpha_char(), alnum_char().star()])],
        ),
        // RuleBody := RuleOptionDefinition ('|' RuleOptionDefinition)*
        plain(
            "RuleBody",
            vec![seq(vec![
                r("RuleOptionDefinition"),
                seq(vec![
                    ws_opt(),
                    exact("|").omit(),
                    ws_opt(),
                    r("RuleOptionDefinition"),
                ])
                .star(),
            ])],
        ),
        plain(
            "RuleOptionDefinition",
            vec![seq(vec![
                r("FullMatcher"),
                seq(vec![ws_opt(), r("FullMatcher")]).star(),
            ])],
        ),
        // FullMatcher := '!'? Matcher MatcherModifiers MatcherActions
        plain(
            "FullMatcher",
            vec![seq(vec![
                r("MatcherModifierInvert").optional(),
                r("Matcher"),
                r("MatcherModifiers"),
                r("MatcherActions"),
            ])],
        ),
        hidden(
            "Matcher",
            vec![
                seq(vec![r("MatchAnyChar")]),
                seq(vec![r("MatchAll")]),
                seq(vec![r("MatchAny")]),
                seq(vec![r("MatchRange")]),
                seq(vec![r("MatchExact")]),
                seq(vec![r("MatchStack")]),
                seq(vec![r("MatchRule")]),
            ],
        ),
        plain("MatchAnyChar", vec![seq(vec![exact(".").omit()])]),
        plain(
            "MatchAll",
            vec![seq(vec![
                exact("(").omit(),
                ws_opt(),
                seq(vec![r("FullMatcher"), ws_opt()]).star(),
                exact(")").omit(),
            ])],
        ),
        plain(
            "MatchAny",
            vec![seq(vec![
                exact("[").omit(),
                ws_opt(),
                seq(vec![r("FullMatcher"), ws_opt()]).star(),
                exact("]").omit(),
            ])],
        ),
        plain(
            "MatchRange",
            vec![seq(vec![
                exact("'").omit(),
                r("Char"),
                r("Char"),
                exact("'").omit(),
            ])],
        ),
        // One raw character; quotes, backslashes, and newlines end a range.
        plain(
            "Char",
            vec![seq(vec![choice(vec![
                exact("'"),
                exact("\\"),
                exact("\n"),
            ])
            .invert()])],
        ),
        plain(
            "MatchExact",
            vec![seq(vec![
                exact("\"").omit(),
                r("String"),
                exact("\"").omit(),
            ])],
        ),
        // String body: plain runs fuse into single leaves; escape
        // sequences remain as named nodes for the loader to decode.
        fused(
            "String",
            vec![seq(vec![choice(vec![
                r("EscapeSequence"),
                choice(vec![exact("\""), exact("\\")]).invert(),
            ])
            .star()])],
        ),
        fused(
            "EscapeSequence",
            vec![seq(vec![
                exact("\\").omit(),
                choice(vec![
                    seq(vec![exact("x"), hex_char(), hex_char()]),
                    Matcher::any_char(),
                ]),
            ])],
        ),
        plain(
            "MatchStack",
            vec![seq(vec![
                exact(":").omit(),
                r("Identifier"),
                exact(".").omit(),
                r("Integer"),
                exact(":").omit(),
            ])],
        ),
        plain("MatchRule", vec![seq(vec![r("Identifier")])]),
        // MatcherModifiers := '!'? Quantifier? '~'? '_'? ('->' ...)?
        plain(
            "MatcherModifiers",
            vec![seq(vec![
                r("MatcherModifierInvert").optional(),
                r("MatcherModifierQuantifier").optional(),
                r("MatcherModifierLookAhead").optional(),
                r("MatcherModifierOmitMatch").optional(),
                r("MatcherModifierReplaceMatch").optional(),
            ])],
        ),
        plain("MatcherModifierInvert", vec![seq(vec![exact("!").omit()])]),
        plain(
            "MatcherModifierQuantifier",
            vec![
                seq(vec![r("QuantifierSymbolic")]),
                seq(vec![
                    exact("#").omit(),
                    choice(vec![
                        r("QuantifierLowerBound"),
                        r("QuantifierUpperBound"),
                        r("QuantifierRange"),
                        r("QuantifierExact"),
                    ]),
                ]),
            ],
        ),
        fused(
            "QuantifierSymbolic",
            vec![seq(vec![choice(vec![
                exact("?"),
                exact("*"),
                exact("+"),
            ])])],
        ),
        plain(
            "QuantifierLowerBound",
            vec![seq(vec![exact(">").omit(), r("Integer")])],
        ),
        plain(
            "QuantifierUpperBound",
            vec![seq(vec![exact("<").omit(), r("Integer")])],
        ),
        plain(
            "QuantifierRange",
            vec![seq(vec![r("Integer"), exact("-").omit(), r("Integer")])],
        ),
        plain("QuantifierExact", vec![seq(vec![r("Integer")])]),
        plain(
            "MatcherModifierLookAhead",
            vec![seq(vec![exact("~").omit()])],
        ),
        plain(
            "MatcherModifierOmitMatch",
            vec![seq(vec![exact("_").omit()])],
        ),
        plain(
            "MatcherModifierReplaceMatch",
            vec![seq(vec![
                exact("->").omit(),
                choice(vec![
                    seq(vec![exact("\"").omit(), r("String"), exact("\"").omit()]),
                    r("MatchStack"),
                    r("Identifier"),
                ]),
            ])],
        ),
        // MatcherActions := ('{' Trigger ':' '[' ... ']' (',' ...)* '}')*
        plain("MatcherActions", vec![seq(vec![r("ActionBlock").star()])]),
        hidden(
            "ActionBlock",
            vec![seq(vec![
                ws_opt(),
                exact("{").omit(),
                ws_opt(),
                r("MatcherTrigger"),
                seq(vec![
                    ws_opt(),
                    exact(",").omit(),
                    ws_opt(),
                    r("MatcherTrigger"),
                ])
                .star(),
                ws_opt(),
                exact("}").omit(),
            ])],
        ),
        plain(
            "MatcherTrigger",
            vec![seq(vec![
                r("Identifier"),
                ws_opt(),
                exact(":").omit(),
                ws_opt(),
                r("ActionList"),
            ])],
        ),
        plain(
            "ActionList",
            vec![seq(vec![
                exact("[").omit(),
                ws_opt(),
                r("MatcherAction"),
                seq(vec![
                    ws_opt(),
                    exact(",").omit(),
                    ws_opt(),
                    r("MatcherAction"),
                ])
                .star(),
                ws_opt(),
                exact("]").omit(),
            ])],
        ),
        plain(
            "MatcherAction",
            vec![seq(vec![
                r("Identifier"),
                ws_opt(),
                exact("(").omit(),
                ws_opt(),
                r("ActionArgList"),
                ws_opt(),
                exact(")").omit(),
            ])],
        ),
        plain(
            "ActionArgList",
            vec![seq(vec![seq(vec![
                r("ActionArg"),
                seq(vec![
                    ws_opt(),
                    exact(",").omit(),
                    ws_opt(),
                    r("ActionArg"),
                ])
                .star(),
            ])
            .optional()])],
        ),
        hidden(
            "ActionArg",
            vec![
                seq(vec![exact("\"").omit(), r("String"), exact("\"").omit()]),
                seq(vec![r("MatchedText")]),
                seq(vec![r("Identifier")]),
            ],
        ),
        plain("MatchedText", vec![seq(vec![exact("_").omit()])]),
        // Integer := '0x' hex+ | '0b' bin+ | '0' oct+ | dec+, with the
        // base recorded as a zero-width marker node after the digits.
        fused(
            "Integer",
            vec![
                seq(vec![
                    exact("0x").omit(),
                    hex_char().plus(),
                    marker("FormatHex"),
                ]),
                seq(vec![
                    exact("0b").omit(),
                    range("0", "1").plus(),
                    marker("FormatBin"),
                ]),
                seq(vec![
                    exact("0").omit(),
                    range("0", "7").plus(),
                    marker("FormatOct"),
                ]),
                seq(vec![range("0", "9").plus(), marker("FormatDec")]),
            ],
        ),
    ];

    Grammar::from_rules("<internal>", rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_grammar_parses_a_minimal_rule() {
        let grammar = internal_grammar();
        let outcome = grammar
            .apply_to("Digit: '09';", "Grammar", "<test>")
            .unwrap();
        assert!(outcome.tree.is_some());
        assert_eq!(outcome.end_position.index, 12);

        let tree = outcome.tree.unwrap();
        let definition = tree.expect_child("RuleDefinition").unwrap();
        let header = definition.expect_child("RuleHeader").unwrap();
        assert_eq!(header.expect_child("Identifier").unwrap().to_text(), "Digit");
        let body = definition.expect_child("RuleBody").unwrap();
        assert!(body
            .expect_child("RuleOptionDefinition.FullMatcher.MatchRange")
            .is_ok());
    }

    #[test]
    fn internal_grammar_parses_modifiers_actions_and_stacks() {
        let grammar = internal_grammar();
        let text = "Tag: \"<\" Name{onMatch:[push(_, names)]} \">\" !\"<\"* \"</\" :names.0:{onMatch:[pop(names)]} \">\";";
        let outcome = grammar.apply_to(text, "Grammar", "<test>").unwrap();
        assert!(outcome.tree.is_some());
        assert_eq!(outcome.end_position.index, text.len());
    }

    #[test]
    fn internal_grammar_stops_at_garbage() {
        let grammar = internal_grammar();
        let outcome = grammar
            .apply_to("Digit: '09'; 123", "Grammar", "<test>")
            .unwrap();
        // The top-level star simply stops; the caller detects the
        // incomplete consumption.
        assert!(outcome.tree.is_some());
        assert!(outcome.end_position.index < "Digit: '09'; 123".len());
    }

    #[test]
    fn internal_grammar_parses_comments_between_rules() {
        let grammar = internal_grammar();
        let text = "\\ leading comment\nDigit: '09';\n\\ trailing comment\n";
        let outcome = grammar.apply_to(text, "Grammar", "<test>").unwrap();
        assert!(outcome.tree.is_some());
        assert_eq!(outcome.end_position.index, text.len());
    }
}
