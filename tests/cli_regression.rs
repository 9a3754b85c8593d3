// tests/cli_regression.rs
//
// End-to-end CLI behavior through the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn write_fixtures(dir: &std::path::Path, grammar: &str, input: &str) -> (String, String) {
    let grammar_path = dir.join("grammar.peg");
    let input_path = dir.join("input.txt");
    std::fs::write(&grammar_path, grammar).unwrap();
    std::fs::write(&input_path, input).unwrap();
    (
        grammar_path.display().to_string(),
        input_path.display().to_string(),
    )
}

#[test]
fn help_lists_the_modes() {
    Command::cargo_bin("gramarye")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("verify")
                .and(predicate::str::contains("graph"))
                .and(predicate::str::contains("render")),
        );
}

#[test]
fn verify_succeeds_on_a_full_parse() {
    let dir = tempfile::tempdir().unwrap();
    let (grammar, input) = write_fixtures(dir.path(), "S: \"ab\"+;\n", "ababab");

    Command::cargo_bin("gramarye")
        .unwrap()
        .args(["verify", &format!("{grammar}:S"), &input])
        .assert()
        .success()
        .stdout(predicate::str::contains("Done"));
}

#[test]
fn verify_fails_on_a_partial_parse() {
    let dir = tempfile::tempdir().unwrap();
    let (grammar, input) = write_fixtures(dir.path(), "S: \"ab\"+;\n", "ababX");

    Command::cargo_bin("gramarye")
        .unwrap()
        .args(["verify", &format!("{grammar}:S"), &input])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn verify_fails_on_a_bad_grammar() {
    let dir = tempfile::tempdir().unwrap();
    let (grammar, input) = write_fixtures(dir.path(), "S: !!!;\n", "x");

    Command::cargo_bin("gramarye")
        .unwrap()
        .args(["verify", &format!("{grammar}:S"), &input])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn graph_writes_a_digraph() {
    let dir = tempfile::tempdir().unwrap();
    let (grammar, input) = write_fixtures(dir.path(), "Digit: '09';\n", "7");
    let output = dir.path().join("tree.dot");

    Command::cargo_bin("gramarye")
        .unwrap()
        .args([
            "graph",
            &format!("{grammar}:Digit"),
            &input,
            &output.display().to_string(),
        ])
        .assert()
        .success();

    let dot = std::fs::read_to_string(&output).unwrap();
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("rankdir=LR"));
    assert!(dot.contains("Digit"));
    // Verbose labels carry positions.
    assert!(dot.contains("1:1 -> 1:2"));
}

#[test]
fn missing_entry_point_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (grammar, input) = write_fixtures(dir.path(), "S: .;\n", "x");

    Command::cargo_bin("gramarye")
        .unwrap()
        .args(["verify", &grammar, &input])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn unknown_entry_rule_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (grammar, input) = write_fixtures(dir.path(), "S: .;\n", "x");

    Command::cargo_bin("gramarye")
        .unwrap()
        .args(["verify", &format!("{grammar}:Nope"), &input])
        .assert()
        .failure()
        .code(1);
}
