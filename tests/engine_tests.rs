// tests/engine_tests.rs
//
// End-to-end engine behavior: grammars loaded from text and applied to
// input, exercising matching, backtracking, stacks, actions, and the
// farthest-match report.

use gramarye::diagnostics::ErrorKind;
use gramarye::state::BufferSink;
use gramarye::tree::ParseTree;
use gramarye::Grammar;

fn load(text: &str) -> Grammar {
    Grammar::load_from_text(text, "test.peg").expect("grammar should load")
}

#[test]
fn digit_rule_yields_a_named_node_with_one_leaf() {
    let grammar = load("Digit: '09';");
    let outcome = grammar.apply_to("7", "Digit", "in.txt").unwrap();

    assert_eq!(outcome.end_position.index, 1);
    let tree = outcome.tree.expect("tree");
    let node = tree.as_node().expect("node");
    assert_eq!(node.name, "Digit");
    assert_eq!(node.children.len(), 1);
    let leaf = node.children[0].as_leaf().expect("leaf");
    assert_eq!(leaf.value, "7");
    assert_eq!(leaf.pos_begin.index, 0);
    assert_eq!(leaf.pos_end.index, 1);
}

#[test]
fn greedy_star_leaves_unmatched_input_alone() {
    let grammar = load("S: \"ab\"*;");
    let outcome = grammar.apply_to("ababc", "S", "in.txt").unwrap();

    assert_eq!(outcome.end_position.index, 4);
    let tree = outcome.tree.unwrap();
    let node = tree.as_node().unwrap();
    assert_eq!(node.children.len(), 2);
    assert_eq!(tree.to_text(), "abab");
}

#[test]
fn inverted_matcher_with_plus_consumes_per_byte() {
    let grammar = load("S: !\"x\"+;");
    let outcome = grammar.apply_to("aaax", "S", "in.txt").unwrap();

    assert_eq!(outcome.end_position.index, 3);
    let tree = outcome.tree.unwrap();
    let node = tree.as_node().unwrap();
    assert_eq!(node.children.len(), 3);
    for (i, child) in node.children.iter().enumerate() {
        let leaf = child.as_leaf().expect("single-byte leaf");
        assert_eq!(leaf.value, "a");
        assert_eq!(leaf.pos_begin.index, i);
    }
}

#[test]
fn stack_round_trip_matches_closing_tag_and_drains_the_stack() {
    let grammar = load(concat!(
        "Tag: \"<\" Name{onMatch:[push(_, names)]} \">\" !\"<\"* \"</\" ",
        ":names.0:{onMatch:[pop(names)]} \">\";\n",
        "Name(fuse): ['az' 'AZ']+;\n",
    ));
    let outcome = grammar.apply_to("<b>hi</b>", "Tag", "in.txt").unwrap();

    // A non-empty stack would have been a post-condition error, so
    // reaching a tree at all proves the push/pop balanced out.
    assert_eq!(outcome.end_position.index, 9);
    assert_eq!(outcome.tree.unwrap().to_text(), "<b>hi</b>");
}

#[test]
fn mismatched_closing_tag_fails() {
    let grammar = load(concat!(
        "Tag: \"<\" Name{onMatch:[push(_, names)]} \">\" !\"<\"* \"</\" ",
        ":names.0:{onMatch:[pop(names)]} \">\";\n",
        "Name(fuse): ['az' 'AZ']+;\n",
    ));
    let outcome = grammar.apply_to("<b>hi</i>", "Tag", "in.txt").unwrap();
    assert!(outcome.tree.is_none());
}

#[test]
fn fail_action_aborts_with_position_and_message() {
    let grammar = load("S: \"a\"{onMatch:[fail(\"nope\")]};");
    let err = grammar.apply_to("a", "S", "input.txt").unwrap_err();

    assert!(matches!(err.kind, ErrorKind::ExplicitFail { .. }));
    assert_eq!(err.to_string(), "input.txt:1:1: FAIL: nope");
}

#[test]
fn message_action_writes_position_prefixed_lines_to_the_sink() {
    let grammar = load("S: \"a\"{onMatch:[message(\"seen a\")]};");
    let mut sink = BufferSink::default();
    grammar
        .apply_to_with_sink("a", "S", "in.txt", &mut sink)
        .unwrap();
    assert_eq!(sink.messages, vec!["in.txt:1:1: MSG: seen a".to_string()]);
}

#[test]
fn unbalanced_push_is_a_post_condition_error() {
    let grammar = load("S: \"a\"{onMatch:[push(_, leftovers)]};");
    let err = grammar.apply_to("a", "S", "in.txt").unwrap_err();

    match err.kind {
        ErrorKind::StacksNotEmpty { dump } => {
            assert!(dump.contains("Stack 'leftovers'"));
            assert!(dump.contains("-> a <-"));
        }
        other => panic!("expected StacksNotEmpty, got {other:?}"),
    }
}

#[test]
fn pop_from_empty_stack_is_fatal() {
    let grammar = load("S: \"a\"{onMatch:[pop(names)]};");
    let err = grammar.apply_to("a", "S", "in.txt").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EmptyStackPop { .. }));
}

#[test]
fn pushes_inside_failed_options_are_rolled_back() {
    // The first option pushes after "x" matches, then fails on "y"; the
    // second option succeeds without touching the stack. A surviving push
    // would trip the post-condition.
    let grammar = load(concat!(
        "S: A | B;\n",
        "A: \"x\"{onMatch:[push(_, s)]} \"y\";\n",
        "B: \"x\";\n",
    ));
    let outcome = grammar.apply_to("x", "S", "in.txt").unwrap();
    assert!(outcome.tree.is_some());
}

#[test]
fn look_ahead_rewinds_the_cursor_but_not_the_farthest_mark() {
    let grammar = load("S: \"ab\"~ \"a\";");
    let outcome = grammar.apply_to("ab", "S", "in.txt").unwrap();

    // The look-ahead reached byte 2; the rule itself consumed one byte.
    assert!(outcome.tree.is_some());
    assert_eq!(outcome.end_position.index, 2);
}

#[test]
fn farthest_position_points_at_the_best_attempt_on_failure() {
    let grammar = load("S: \"ab\" \"cd\";");
    let outcome = grammar.apply_to("abce", "S", "in.txt").unwrap();

    assert!(outcome.tree.is_none());
    assert_eq!(outcome.end_position.index, 2);
    assert_eq!(outcome.end_position.line, 1);
    assert_eq!(outcome.end_position.column, 3);
}

#[test]
fn unknown_rule_reference_fails_loudly_at_evaluation() {
    let grammar = load("S: Missing;");
    let err = grammar.apply_to("x", "S", "in.txt").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleNotFound { .. }));
}

#[test]
fn unknown_entry_rule_is_an_error() {
    let grammar = load("S: .;");
    let err = grammar.apply_to("x", "Nope", "in.txt").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RuleNotFound { .. }));
}

#[test]
fn hidden_rules_splice_into_their_parent() {
    let grammar = load(concat!(
        "Pair: Letter Letter;\n",
        "Letter(hidden): 'az';\n",
    ));
    let outcome = grammar.apply_to("ab", "Pair", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    let node = tree.as_node().unwrap();
    // No Letter nodes survive; their leaves land directly in Pair.
    assert_eq!(node.children.len(), 2);
    assert!(node.children.iter().all(|c| c.as_leaf().is_some()));
}

#[test]
fn fused_rules_produce_no_adjacent_leaves() {
    let grammar = load("Word(fuse): ['az' '09']+;");
    let outcome = grammar.apply_to("a1b2", "Word", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    let node = tree.as_node().unwrap();

    assert_eq!(node.children.len(), 1);
    let mut prev_was_leaf = false;
    for child in &node.children {
        let is_leaf = child.as_leaf().is_some();
        assert!(!(prev_was_leaf && is_leaf), "adjacent leaves after fuse");
        prev_was_leaf = is_leaf;
    }
}

#[test]
fn leaf_concatenation_matches_the_consumed_input_span() {
    let grammar = load("S: ['az' '09']+;");
    let input = "a1b2";
    let outcome = grammar.apply_to(input, "S", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    let begin = tree.pos_begin().index;
    let end = tree.pos_end().index;
    assert_eq!(tree.to_text(), &input[begin..end]);
}

#[test]
fn repeated_parses_are_deterministic() {
    let grammar = load(concat!(
        "Expr: Term (\"+\" Term)*;\n",
        "Term(fuse): '09'+;\n",
    ));
    let first = grammar.apply_to("1+23+4", "Expr", "in.txt").unwrap();
    let second = grammar.apply_to("1+23+4", "Expr", "in.txt").unwrap();

    let t1 = first.tree.unwrap();
    let t2 = second.tree.unwrap();
    assert_eq!(t1.to_text(), t2.to_text());
    assert_eq!(first.end_position.index, second.end_position.index);
    assert_eq!(
        t1.as_node().unwrap().children.len(),
        t2.as_node().unwrap().children.len()
    );
}

#[test]
fn path_queries_address_children_of_a_parsed_tree() {
    let grammar = load(concat!(
        "Expr: Ident Op Ident Op;\n",
        "Ident(fuse): 'az'+;\n",
        "Op(fuse): [\"+\" \"-\"];\n",
    ));
    let outcome = grammar.apply_to("ab+cd-", "Expr", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();

    assert_eq!(tree.expect_child("Op#0").unwrap().to_text(), "+");
    assert_eq!(tree.expect_child("Op#1").unwrap().to_text(), "-");
    assert_eq!(tree.expect_child("Ident#1").unwrap().to_text(), "cd");
    assert!(tree.expect_child("Op#2").is_err());
}

#[test]
fn match_replacement_by_identifier_renames_the_node() {
    let grammar = load(concat!(
        "S: Inner->Renamed;\n",
        "Inner: 'az';\n",
    ));
    let outcome = grammar.apply_to("a", "S", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    // The entry rule names the root; the replacement applies to the
    // matcher around the rule reference inside the option.
    assert!(tree.expect_child("Renamed").is_ok());
}

#[test]
fn match_replacement_by_string_synthesizes_zero_width_text() {
    let grammar = load("S: \"abc\"->\"X\" \"d\";");
    let outcome = grammar.apply_to("abcd", "S", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    assert_eq!(tree.to_text(), "Xd");
    assert_eq!(outcome.end_position.index, 4);
}

#[test]
fn match_replacement_from_stack_reads_the_saved_value() {
    let grammar = load(concat!(
        "S: Word{onMatch:[push(_, s)]} \"-\"->:s.0: \"!\"{onMatch:[pop(s)]};\n",
        "Word(fuse): 'az'+;\n",
    ));
    let outcome = grammar.apply_to("ab-!", "S", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    assert_eq!(tree.to_text(), "abab!");
}

#[test]
fn parse_tree_positions_track_lines_and_columns() {
    let grammar = load("S: \"a\\n\" \"b\";");
    let outcome = grammar.apply_to("a\nb", "S", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();
    let node = tree.as_node().unwrap();

    let first = node.children[0].as_leaf().unwrap();
    assert_eq!((first.pos_begin.line, first.pos_begin.column), (1, 1));
    let second = node.children[1].as_leaf().unwrap();
    assert_eq!((second.pos_begin.line, second.pos_begin.column), (2, 1));
}

#[test]
fn on_fail_actions_fire_before_the_checkpoint_restores() {
    // The failing matcher reports via message while its own stack effects
    // are still visible; the buffer sink captures the evidence.
    let grammar = load(concat!(
        "S: Try | \"x\";\n",
        "Try: \"x\"{onMatch:[push(_, s)]} \"y\"{onFail:[message(\"failing\")]};\n",
    ));
    let mut sink = BufferSink::default();
    let outcome = grammar
        .apply_to_with_sink("x", "S", "in.txt", &mut sink)
        .unwrap();
    assert!(outcome.tree.is_some());
    assert_eq!(sink.messages, vec!["in.txt:1:2: MSG: failing".to_string()]);
}

#[test]
fn stack_reference_out_of_range_matches_the_empty_string() {
    let grammar = load("S: :ghost.3: \"a\";");
    let outcome = grammar.apply_to("a", "S", "in.txt").unwrap();
    assert!(outcome.tree.is_some());
    assert_eq!(outcome.end_position.index, 1);
}

#[test]
fn serde_round_trips_the_parse_tree() {
    let grammar = load("Digit: '09';");
    let outcome = grammar.apply_to("7", "Digit", "in.txt").unwrap();
    let tree = outcome.tree.unwrap();

    let json = serde_json::to_string(&tree).unwrap();
    let back: ParseTree = serde_json::from_str(&json).unwrap();
    assert_eq!(tree, back);
}
