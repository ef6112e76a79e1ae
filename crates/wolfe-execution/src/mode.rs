use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How orders reach the market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorMode {
    Live,
    DryRun,
    /// Observe only. `HONEYPOT` and `PAPER` are accepted as aliases.
    Shadow,
}

impl ExecutorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorMode::Live => "LIVE",
            ExecutorMode::DryRun => "DRY_RUN",
            ExecutorMode::Shadow => "SHADOW",
        }
    }
}

impl std::fmt::Display for ExecutorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeParseError(pub String);

impl std::fmt::Display for ModeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown executor mode {:?} (expected LIVE, DRY_RUN or SHADOW)",
            self.0
        )
    }
}

impl std::error::Error for ModeParseError {}

impl FromStr for ExecutorMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "LIVE" => Ok(ExecutorMode::Live),
            "DRY_RUN" | "DRYRUN" => Ok(ExecutorMode::DryRun),
            "SHADOW" | "HONEYPOT" | "PAPER" => Ok(ExecutorMode::Shadow),
            _ => Err(ModeParseError(s.to_string())),
        }
    }
}
