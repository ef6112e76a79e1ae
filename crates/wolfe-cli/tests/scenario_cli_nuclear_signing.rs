//! Scenario: offline key generation and day-nonce signing.
//!
//! # Invariants under test
//! - `nuclear keygen` writes a key file and refuses to overwrite it.
//! - `nuclear sign --day` signs exactly the printed nonce, and the signature
//!   verifies against the printed public key.
//! - `nuclear nonce --day` echoes the normalized day; a bad day fails.

use assert_cmd::prelude::*;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::Signature;
use predicates::prelude::*;
use std::process::Command;

fn field<'a>(stdout: &'a str, name: &str) -> &'a str {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix(&format!("{name}=")))
        .unwrap_or_else(|| panic!("missing {name}= in output:\n{stdout}"))
}

#[test]
fn keygen_then_sign_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let key_file = dir.path().join("nuclear.key");
    let key_path = key_file.to_string_lossy().to_string();

    let out = Command::cargo_bin("wolfe-cli")
        .unwrap()
        .args(["nuclear", "keygen", "--out", &key_path])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let pubkey = wolfe_nuclear::parse_verifying_key(field(&stdout, "public_key_b64")).unwrap();

    Command::cargo_bin("wolfe-cli")
        .unwrap()
        .args(["nuclear", "keygen", "--out", &key_path])
        .assert()
        .failure()
        .stderr(predicate::str::contains("REFUSING KEYGEN"));

    let out = Command::cargo_bin("wolfe-cli")
        .unwrap()
        .args(["nuclear", "sign", "--key-file", &key_path, "--day", "2026-03-02"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert_eq!(field(&stdout, "nonce"), "2026-03-02");

    let raw = B64.decode(field(&stdout, "signature_b64")).unwrap();
    let sig = Signature::from_slice(&raw).unwrap();
    pubkey.verify_strict(b"2026-03-02", &sig).unwrap();
}

#[test]
fn nonce_day_override() {
    Command::cargo_bin("wolfe-cli")
        .unwrap()
        .args(["nuclear", "nonce", "--day", "2026-12-31"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nonce=2026-12-31"));

    Command::cargo_bin("wolfe-cli")
        .unwrap()
        .args(["nuclear", "nonce", "--day", "31/12/2026"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected YYYY-MM-DD"));
}

