use std::fs;

use super::*;

fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    path.push(format!(
        "otapack-security-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        name
    ));
    fs::write(&path, contents).expect("must write temp file");
    path
}

#[test]
fn sha256_hex_known_vector() {
    // The well-known digest of the empty input.
    assert_eq!(
        sha256_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn file_hash_matches_slice_hash() {
    let path = temp_file("bundle", b"bundle payload bytes");
    let from_file = sha256_file_hex(&path).expect("must hash file");
    assert_eq!(from_file, sha256_hex(b"bundle payload bytes"));
    let _ = fs::remove_file(path);
}

#[test]
fn digest_comparison_ignores_case() {
    assert!(digests_match("AbCdEf", "abcdef"));
    assert!(!digests_match("abcdef", "abcde0"));
}

#[test]
fn verify_accepts_uppercase_expectation() {
    let path = temp_file("verify-ok", b"abc");
    verify_sha256_file(
        &path,
        "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD",
    )
    .expect("uppercase digest must verify");
    let _ = fs::remove_file(path);
}

#[test]
fn verify_rejects_wrong_digest() {
    let path = temp_file("verify-bad", b"abc");
    let err = verify_sha256_file(&path, "deadbeef").expect_err("must reject wrong digest");
    assert!(err.to_string().contains("sha256 mismatch"));
    let _ = fs::remove_file(path);
}

#[test]
fn missing_file_is_an_error() {
    let mut path = std::env::temp_dir();
    path.push("otapack-security-tests-definitely-missing");
    assert!(sha256_file_hex(&path).is_err());
}
