// src/types.rs
//! Core data types shared by the cache, chain client, coordinator and resolver.

use crate::error::DividendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// One `(netuid, hotkey, dividend)` triple as read from chain state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DividendRecord {
    pub netuid: u16,
    pub hotkey: String,
    pub dividend: u64,
}

impl DividendRecord {
    pub fn new(netuid: u16, hotkey: impl Into<String>, dividend: u64) -> Self {
        Self {
            netuid,
            hotkey: hotkey.into(),
            dividend,
        }
    }
}

/// Opaque token pinning reads to one chain state (a block hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainReference(String);

impl ChainReference {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::NotStarted => "not_started",
            RefreshStatus::InProgress => "in_progress",
            RefreshStatus::Completed => "completed",
            RefreshStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshStatus {
    type Err = DividendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "not_started" => Ok(RefreshStatus::NotStarted),
            "in_progress" => Ok(RefreshStatus::InProgress),
            "completed" => Ok(RefreshStatus::Completed),
            "failed" => Ok(RefreshStatus::Failed),
            other => Err(DividendError::ParseError(format!(
                "unknown refresh status '{}'",
                other
            ))),
        }
    }
}

/// Rejects subnet ids outside the served range before any cache or chain access.
pub fn validate_netuid(netuid: u16, subnets: &RangeInclusive<u16>) -> Result<u16, DividendError> {
    if subnets.contains(&netuid) {
        Ok(netuid)
    } else {
        Err(DividendError::InvalidInput(format!(
            "Invalid netuid provided: {} (expected {}..={})",
            netuid,
            subnets.start(),
            subnets.end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in [
            RefreshStatus::NotStarted,
            RefreshStatus::InProgress,
            RefreshStatus::Completed,
            RefreshStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RefreshStatus>().unwrap(), status);
        }
        assert!("running".parse::<RefreshStatus>().is_err());
    }

    #[test]
    fn netuid_range_is_inclusive() {
        let subnets = 1..=50;
        assert!(validate_netuid(1, &subnets).is_ok());
        assert!(validate_netuid(50, &subnets).is_ok());
        assert!(matches!(
            validate_netuid(0, &subnets),
            Err(DividendError::InvalidInput(_))
        ));
        assert!(validate_netuid(99, &subnets).is_err());
    }
}
