use std::fs;
use std::path::PathBuf;

use super::*;

fn test_root(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    path.push(format!(
        "otapack-patch-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        name
    ));
    path
}

#[test]
fn diff_replaces_single_line() {
    let original = "line one\nline two\nline three\n";
    let patch = "--- a/index.js\n+++ b/index.js\n@@ -1,3 +1,3 @@\n line one\n-line two\n+line 2\n line three\n";
    let result = apply_unified_diff(original, patch).expect("must apply");
    assert_eq!(result, "line one\nline 2\nline three\n");
}

#[test]
fn diff_appends_at_end() {
    let original = "a\nb\n";
    let patch = "@@ -2,1 +2,2 @@\n b\n+c\n";
    let result = apply_unified_diff(original, patch).expect("must apply");
    assert_eq!(result, "a\nb\nc\n");
}

#[test]
fn diff_applies_multiple_hunks_in_order() {
    let original = "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\n";
    let patch = "@@ -1,2 +1,2 @@\n l1\n-l2\n+L2\n@@ -7,2 +7,2 @@\n l7\n-l8\n+L8\n";
    let result = apply_unified_diff(original, patch).expect("must apply");
    assert_eq!(result, "l1\nL2\nl3\nl4\nl5\nl6\nl7\nL8\n");
}

#[test]
fn diff_inserts_into_empty_file() {
    let patch = "@@ -0,0 +1,2 @@\n+a\n+b\n";
    let result = apply_unified_diff("", patch).expect("must apply");
    assert_eq!(result, "a\nb\n");
}

#[test]
fn diff_honors_no_newline_marker() {
    let original = "a\n";
    let patch = "@@ -1,1 +1,1 @@\n-a\n+b\n\\ No newline at end of file\n";
    let result = apply_unified_diff(original, patch).expect("must apply");
    assert_eq!(result, "b");
}

#[test]
fn diff_preserves_untouched_tail_without_newline() {
    let original = "a\nb";
    let patch = "@@ -1,1 +1,1 @@\n-a\n+A\n";
    let result = apply_unified_diff(original, patch).expect("must apply");
    assert_eq!(result, "A\nb");
}

#[test]
fn empty_patch_leaves_original_untouched() {
    let original = "unchanged\ncontent\n";
    assert_eq!(
        apply_unified_diff(original, "").expect("must apply"),
        original
    );
}

#[test]
fn diff_rejects_context_mismatch() {
    let original = "actual line\n";
    let patch = "@@ -1,1 +1,1 @@\n-expected line\n+replacement\n";
    let err = apply_unified_diff(original, patch).expect_err("must reject");
    assert!(matches!(err, PatchError::ContextMismatch { line: 1, .. }));
}

#[test]
fn diff_rejects_hunk_past_end_of_file() {
    let original = "a\n";
    let patch = "@@ -5,1 +5,1 @@\n-a\n+b\n";
    let err = apply_unified_diff(original, patch).expect_err("must reject");
    assert!(matches!(err, PatchError::OutOfBounds { .. }));
}

#[test]
fn diff_rejects_count_mismatch() {
    let patch = "@@ -1,2 +1,2 @@\n a\n";
    let err = apply_unified_diff("a\nb\n", patch).expect_err("must reject");
    assert!(matches!(err, PatchError::Malformed { .. }));
}

#[test]
fn diff_rejects_garbage_hunk_header() {
    let patch = "@@ nonsense @@\n";
    let err = apply_unified_diff("a\n", patch).expect_err("must reject");
    assert!(matches!(err, PatchError::Malformed { .. }));
}

#[test]
fn manifest_parses_camel_case_json() {
    let raw = r#"{
        "deletedFiles": ["old.js"],
        "newFiles": ["new.js"],
        "patchedFiles": {"index.js": "@@ -1,1 +1,1 @@\n-a\n+b\n"}
    }"#;
    let manifest = PatchManifest::from_json_str(raw).expect("must parse");
    assert_eq!(manifest.deleted_files, vec!["old.js"]);
    assert_eq!(manifest.new_files, vec!["new.js"]);
    assert!(manifest.patched_files.contains_key("index.js"));
}

#[test]
fn manifest_defaults_missing_sections() {
    let manifest = PatchManifest::from_json_str("{}").expect("must parse");
    assert!(manifest.deleted_files.is_empty());
    assert!(manifest.new_files.is_empty());
    assert!(manifest.patched_files.is_empty());
}

#[test]
fn apply_patch_full_scenario() {
    let root = test_root("scenario");
    let source = root.join("source");
    let payload = root.join("payload");
    let target = root.join("target");
    fs::create_dir_all(&source).expect("must create source");
    fs::create_dir_all(&payload).expect("must create payload");

    fs::write(
        source.join("index.js"),
        "console.log('v1');\nmodule.exports = 1;\n",
    )
    .expect("must write index.js");
    fs::write(source.join("old.js"), "legacy\n").expect("must write old.js");
    fs::write(source.join("kept.js"), "kept as-is\n").expect("must write kept.js");
    fs::write(payload.join("new.js"), "brand new file\n").expect("must write new.js");

    let manifest = PatchManifest {
        deleted_files: vec!["old.js".to_string()],
        new_files: vec!["new.js".to_string()],
        patched_files: [(
            "index.js".to_string(),
            "@@ -1,2 +1,2 @@\n-console.log('v1');\n+console.log('v2');\n module.exports = 1;\n"
                .to_string(),
        )]
        .into(),
    };

    apply_patch(&source, &payload, &target, &manifest).expect("must apply patch");

    assert!(!target.join("old.js").exists());
    assert_eq!(
        fs::read_to_string(target.join("new.js")).expect("must read new.js"),
        "brand new file\n"
    );
    assert_eq!(
        fs::read_to_string(target.join("index.js")).expect("must read index.js"),
        "console.log('v2');\nmodule.exports = 1;\n"
    );
    assert_eq!(
        fs::read_to_string(target.join("kept.js")).expect("must read kept.js"),
        "kept as-is\n"
    );
    // The source tree is never mutated.
    assert_eq!(
        fs::read_to_string(source.join("index.js")).expect("must read source index.js"),
        "console.log('v1');\nmodule.exports = 1;\n"
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn apply_patch_creates_parents_for_new_files() {
    let root = test_root("parents");
    let source = root.join("source");
    let payload = root.join("payload");
    let target = root.join("target");
    fs::create_dir_all(&source).expect("must create source");
    fs::create_dir_all(payload.join("assets/img")).expect("must create payload subdir");
    fs::write(source.join("index.js"), "x\n").expect("must write index.js");
    fs::write(payload.join("assets/img/logo.svg"), "<svg/>").expect("must write asset");

    let manifest = PatchManifest {
        new_files: vec!["assets/img/logo.svg".to_string()],
        ..PatchManifest::default()
    };
    apply_patch(&source, &payload, &target, &manifest).expect("must apply");
    assert!(target.join("assets/img/logo.svg").is_file());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn apply_patch_rejects_escaping_manifest_paths() {
    let root = test_root("escape");
    let source = root.join("source");
    let payload = root.join("payload");
    let target = root.join("target");
    fs::create_dir_all(&source).expect("must create source");
    fs::create_dir_all(&payload).expect("must create payload");

    for bad in ["../evil.js", "/etc/passwd"] {
        let manifest = PatchManifest {
            deleted_files: vec![bad.to_string()],
            ..PatchManifest::default()
        };
        let err = apply_patch(&source, &payload, &target, &manifest)
            .expect_err("escaping path must be rejected");
        let text = err.to_string();
        assert!(
            text.contains("must be relative") || text.contains("must not escape"),
            "unexpected error: {text}"
        );
    }
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn apply_patch_fails_when_payload_file_missing() {
    let root = test_root("missing-new");
    let source = root.join("source");
    let payload = root.join("payload");
    let target = root.join("target");
    fs::create_dir_all(&source).expect("must create source");
    fs::create_dir_all(&payload).expect("must create payload");

    let manifest = PatchManifest {
        new_files: vec!["absent.js".to_string()],
        ..PatchManifest::default()
    };
    let err = apply_patch(&source, &payload, &target, &manifest).expect_err("must fail");
    assert!(err.to_string().contains("missing declared new file"));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn apply_patch_fails_on_unclean_diff() {
    let root = test_root("unclean");
    let source = root.join("source");
    let payload = root.join("payload");
    let target = root.join("target");
    fs::create_dir_all(&source).expect("must create source");
    fs::create_dir_all(&payload).expect("must create payload");
    fs::write(source.join("index.js"), "different content\n").expect("must write index.js");

    let manifest = PatchManifest {
        patched_files: [(
            "index.js".to_string(),
            "@@ -1,1 +1,1 @@\n-expected content\n+anything\n".to_string(),
        )]
        .into(),
        ..PatchManifest::default()
    };
    let err = apply_patch(&source, &payload, &target, &manifest).expect_err("must fail");
    assert!(err.to_string().contains("failed to apply text patch"));
    let _ = fs::remove_dir_all(&root);
}
