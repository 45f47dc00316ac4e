// src/cache/keys.rs
//! Cache key scheme. The string forms are shared with other readers of the same Redis
//! database and must not change.

use std::fmt;

pub const DIVIDEND_PREFIX: &str = "tao_dividend";
pub const SENTIMENT_PREFIX: &str = "tao_sentiment";

const BLOCK_HASH: &str = "block_hash";
const UPDATE_STATUS: &str = "update_status";
const UPDATE_START_TIME: &str = "update_start_time";
const UPDATE_PROGRESS: &str = "update_progress";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Dividend { netuid: u16, hotkey: String },
    BlockHash,
    UpdateStatus,
    UpdateStartTime,
    UpdateProgress,
    Sentiment { netuid: u16 },
}

impl CacheKey {
    pub fn dividend(netuid: u16, hotkey: impl Into<String>) -> Self {
        CacheKey::Dividend {
            netuid,
            hotkey: hotkey.into(),
        }
    }

    /// Parses a raw key back into its typed form. The netuid is split off the left, so
    /// hotkeys that themselves contain `:` survive the round trip.
    pub fn parse(raw: &str) -> Option<CacheKey> {
        if let Some(rest) = raw
            .strip_prefix(SENTIMENT_PREFIX)
            .and_then(|r| r.strip_prefix(':'))
        {
            return parse_netuid(rest).map(|netuid| CacheKey::Sentiment { netuid });
        }

        let rest = raw.strip_prefix(DIVIDEND_PREFIX)?.strip_prefix(':')?;
        match rest {
            BLOCK_HASH => Some(CacheKey::BlockHash),
            UPDATE_STATUS => Some(CacheKey::UpdateStatus),
            UPDATE_START_TIME => Some(CacheKey::UpdateStartTime),
            UPDATE_PROGRESS => Some(CacheKey::UpdateProgress),
            _ => {
                let (netuid, hotkey) = rest.split_once(':')?;
                if hotkey.is_empty() {
                    return None;
                }
                Some(CacheKey::Dividend {
                    netuid: parse_netuid(netuid)?,
                    hotkey: hotkey.to_string(),
                })
            }
        }
    }
}

fn parse_netuid(raw: &str) -> Option<u16> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Dividend { netuid, hotkey } => {
                write!(f, "{}:{}:{}", DIVIDEND_PREFIX, netuid, hotkey)
            }
            CacheKey::BlockHash => write!(f, "{}:{}", DIVIDEND_PREFIX, BLOCK_HASH),
            CacheKey::UpdateStatus => write!(f, "{}:{}", DIVIDEND_PREFIX, UPDATE_STATUS),
            CacheKey::UpdateStartTime => write!(f, "{}:{}", DIVIDEND_PREFIX, UPDATE_START_TIME),
            CacheKey::UpdateProgress => write!(f, "{}:{}", DIVIDEND_PREFIX, UPDATE_PROGRESS),
            CacheKey::Sentiment { netuid } => write!(f, "{}:{}", SENTIMENT_PREFIX, netuid),
        }
    }
}

/// Which dividend entries to enumerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DividendFilter {
    All,
    Subnet(u16),
    Account(String),
}

impl DividendFilter {
    /// Glob pattern for `SCAN MATCH`. It may over-match (the account form cannot pin the
    /// netuid/hotkey boundary), so results must still go through [`DividendFilter::accepts`].
    pub fn pattern(&self) -> String {
        match self {
            DividendFilter::All => format!("{}:[0-9]*:*", DIVIDEND_PREFIX),
            DividendFilter::Subnet(netuid) => format!("{}:{}:*", DIVIDEND_PREFIX, netuid),
            DividendFilter::Account(hotkey) => {
                format!("{}:*:{}", DIVIDEND_PREFIX, escape_glob(hotkey))
            }
        }
    }

    pub fn accepts(&self, netuid: u16, hotkey: &str) -> bool {
        match self {
            DividendFilter::All => true,
            DividendFilter::Subnet(n) => *n == netuid,
            DividendFilter::Account(h) => h == hotkey,
        }
    }
}

/// Escapes Redis glob metacharacters so user input matches literally.
pub fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keys_use_the_shared_layout() {
        assert_eq!(CacheKey::dividend(18, "5FFA").to_string(), "tao_dividend:18:5FFA");
        assert_eq!(CacheKey::BlockHash.to_string(), "tao_dividend:block_hash");
        assert_eq!(CacheKey::UpdateStatus.to_string(), "tao_dividend:update_status");
        assert_eq!(CacheKey::UpdateStartTime.to_string(), "tao_dividend:update_start_time");
        assert_eq!(CacheKey::UpdateProgress.to_string(), "tao_dividend:update_progress");
        assert_eq!(CacheKey::Sentiment { netuid: 3 }.to_string(), "tao_sentiment:3");
    }

    #[test]
    fn parse_keeps_colons_inside_hotkey() {
        let key = CacheKey::dividend(7, "weird:hot:key");
        assert_eq!(CacheKey::parse(&key.to_string()), Some(key));
    }

    #[test]
    fn parse_distinguishes_singletons_from_dividends() {
        assert_eq!(CacheKey::parse("tao_dividend:block_hash"), Some(CacheKey::BlockHash));
        assert_eq!(
            CacheKey::parse("tao_dividend:update_progress"),
            Some(CacheKey::UpdateProgress)
        );
        assert_eq!(CacheKey::parse("tao_dividend:x1:abc"), None);
        assert_eq!(CacheKey::parse("tao_dividend:1:"), None);
        assert_eq!(CacheKey::parse("other:1:abc"), None);
        assert_eq!(CacheKey::parse("tao_dividend:+1:abc"), None);
    }

    #[test]
    fn account_pattern_escapes_metacharacters() {
        let filter = DividendFilter::Account("a*b?[c]".to_string());
        assert_eq!(filter.pattern(), r"tao_dividend:*:a\*b\?\[c\]");
        assert!(filter.accepts(3, "a*b?[c]"));
        assert!(!filter.accepts(3, "axb"));
    }
}
