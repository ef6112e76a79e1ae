use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use super::nonce_for;

pub fn keygen(out: &str, force: bool) -> Result<()> {
    if Path::new(out).exists() && !force {
        bail!("REFUSING KEYGEN: {out} exists. Re-run with --force to overwrite");
    }
    let key = wolfe_nuclear::generate_signing_key();
    fs::write(out, wolfe_nuclear::signing_key_b64(&key))
        .with_context(|| format!("write key file failed: {out}"))?;
    println!("key_file={out}");
    println!("public_key_b64={}", wolfe_nuclear::verifying_key_b64(&key));
    Ok(())
}

pub fn pubkey(key_file: &str) -> Result<()> {
    let key = load_key(key_file)?;
    println!("public_key_b64={}", wolfe_nuclear::verifying_key_b64(&key));
    Ok(())
}

pub fn sign(key_file: &str, tz: &str, day: Option<&str>) -> Result<()> {
    let key = load_key(key_file)?;
    let nonce = nonce_for(tz, day)?;
    println!("nonce={nonce}");
    println!(
        "signature_b64={}",
        wolfe_nuclear::sign_day_nonce(&key, &nonce)
    );
    Ok(())
}

fn load_key(key_file: &str) -> Result<ed25519_dalek::SigningKey> {
    let raw =
        fs::read_to_string(key_file).with_context(|| format!("read key file failed: {key_file}"))?;
    wolfe_nuclear::parse_signing_key(&raw)
}
