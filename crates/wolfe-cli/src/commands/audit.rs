use anyhow::{bail, Result};
use wolfe_audit::{AuditLog, VerifyResult};

use super::{audit_key_from_env, parse_day};

pub fn validate(dir: &str, day: &str, key_env: &str) -> Result<()> {
    let date = parse_day(day)?;
    let log = AuditLog::open(dir, &audit_key_from_env(key_env)?)?;
    match log.validate_day(date)? {
        VerifyResult::Valid { lines } => {
            println!("valid=true day={date} lines={lines}");
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("valid=false day={date} line={line}");
            bail!("AUDIT_CHAIN_BROKEN day={date} line={line}: {reason}")
        }
        VerifyResult::Missing => bail!("AUDIT_MISSING no audit file for day={date}"),
    }
}

pub fn show(dir: &str, day: &str, key_env: &str) -> Result<()> {
    let date = parse_day(day)?;
    let log = AuditLog::open(dir, &audit_key_from_env(key_env)?)?;
    for rec in log.read_day(date)? {
        println!("{}", serde_json::to_string(&rec)?);
    }
    Ok(())
}
