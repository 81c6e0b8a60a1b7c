//! Integration tests for the tyweave CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tyweave_core::Node;

fn write_tree(dir: &TempDir, name: &str, node: &Node) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, node.to_json().unwrap()).unwrap();
    path
}

fn assignment_program() -> Node {
    Node::expressions(vec![
        Node::assign(Node::var("a"), Node::int32(1)),
        Node::var("a"),
    ])
}

fn tyweave() -> Command {
    Command::cargo_bin("tyweave").unwrap()
}

// ============================================================================
// Help and version
// ============================================================================

#[test]
fn test_cli_help() {
    tyweave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("type inference"));
}

#[test]
fn test_cli_version() {
    tyweave()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ============================================================================
// infer
// ============================================================================

#[test]
fn test_infer_prints_statement_types() {
    let dir = TempDir::new().unwrap();
    let file = write_tree(&dir, "program.json", &assignment_program());

    tyweave()
        .arg("infer")
        .arg(&file)
        .arg("--no-color")
        .assert()
        .success()
        .stdout("a = 1 : Int32\na : Int32\n");
}

#[test]
fn test_infer_reports_type_errors() {
    let dir = TempDir::new().unwrap();
    let file = write_tree(&dir, "broken.json", &Node::ident("Missing"));

    tyweave()
        .arg("infer")
        .arg(&file)
        .arg("--no-color")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("uninitialized constant Missing"));
}

#[test]
fn test_infer_with_config_file() {
    let dir = TempDir::new().unwrap();
    let file = write_tree(&dir, "program.json", &assignment_program());
    let config = dir.path().join("tyweave.toml");
    fs::write(&config, "[output]\ncolor = false\nshow_source = false\n").unwrap();

    tyweave()
        .arg("infer")
        .arg(&file)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout("Int32\nInt32\n");
}

#[test]
fn test_infer_stats() {
    let dir = TempDir::new().unwrap();
    let file = write_tree(&dir, "program.json", &assignment_program());

    tyweave()
        .arg("infer")
        .arg(&file)
        .arg("--stats")
        .arg("--no-color")
        .assert()
        .success()
        .stderr(predicate::str::contains("Inference statistics"));
}

#[test]
fn test_infer_expands_string_macros() {
    let dir = TempDir::new().unwrap();
    let generated = Node::float64(2.5).to_json().unwrap();
    let program = Node::expressions(vec![
        Node::macro_def("half", &[], Some(Node::string(generated))),
        Node::call(None, "half", vec![]),
    ]);
    let file = write_tree(&dir, "macro.json", &program);

    tyweave()
        .arg("infer")
        .arg(&file)
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::ends_with("half() : Float64\n"));
}

#[test]
fn test_infer_missing_file() {
    tyweave()
        .arg("infer")
        .arg("/nonexistent/program.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_infer_invalid_json() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.json");
    fs::write(&file, "{\"node\": \"nope\"}").unwrap();

    tyweave()
        .arg("infer")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid syntax tree JSON"));
}

// ============================================================================
// print
// ============================================================================

#[test]
fn test_print_renders_surface_syntax() {
    let dir = TempDir::new().unwrap();
    let file = write_tree(&dir, "program.json", &assignment_program());

    tyweave()
        .arg("print")
        .arg(&file)
        .assert()
        .success()
        .stdout("a = 1\na\n");
}
