//! Black-box tests for the `trellis` binary.

use std::process::Command;

fn trellis() -> Command {
    Command::new(env!("CARGO_BIN_EXE_trellis"))
}

#[test]
fn inspect_prints_class_and_methods() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("TodoService.api.json");
    std::fs::write(
        &manifest,
        serde_json::json!({
            "className": "TodoService",
            "methods": [
                {
                    "name": "createTodo",
                    "params": [{"name": "title", "type": {"kind": "keyword", "keyword": "string"}}],
                    "returnType": {"kind": "keyword", "keyword": "string"}
                },
                {
                    "name": "listTodos",
                    "params": [],
                    "returnType": {"kind": "array", "elem": {"kind": "keyword", "keyword": "string"}}
                }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let output = trellis()
        .args(["inspect", "--manifest"])
        .arg(&manifest)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("class TodoService"));
    assert!(stdout.contains("createTodo(title)"));
    assert!(stdout.contains("listTodos()"));
}

#[test]
fn inspect_fails_on_a_malformed_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("broken.api.json");
    std::fs::write(&manifest, "not json").unwrap();

    let output = trellis()
        .args(["inspect", "--manifest"])
        .arg(&manifest)
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn build_requires_an_input_source() {
    let dir = tempfile::tempdir().unwrap();
    let descriptor = dir.path().join("classes.json");
    std::fs::write(&descriptor, "[]").unwrap();

    let output = trellis()
        .args(["build", "--descriptor"])
        .arg(&descriptor)
        .output()
        .unwrap();
    assert!(!output.status.success());
}
