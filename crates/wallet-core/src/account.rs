//! Account identifiers and key roles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 16;

/// Validated chain account name.
///
/// Names are lowercase `a-z0-9.-` and 3 to 16 characters long. The validation
/// also guarantees that a key can never contain the `/` separator used to
/// namespace cache entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountKey(String);

impl AccountKey {
    /// Parse and validate an account name.
    pub fn parse(name: impl Into<String>) -> WalletResult<Self> {
        let name = name.into();
        let invalid = |reason: &str| WalletError::InvalidAccount {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.len() < MIN_NAME_LEN || name.len() > MAX_NAME_LEN {
            return Err(invalid("length must be between 3 and 16"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(invalid("only lowercase letters, digits, '.' and '-' are allowed"));
        }
        if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(invalid("must start with a letter"));
        }
        Ok(Self(name))
    }

    /// Borrow the account name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountKey {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccountKey {
    type Error = WalletError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountKey> for String {
    fn from(key: AccountKey) -> Self {
        key.0
    }
}

/// Authority roles a key can be held for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Owner authority
    Owner,
    /// Active authority (transfers, power up/down)
    Active,
    /// Posting authority (votes)
    Posting,
    /// Memo key
    Memo,
}

impl KeyRole {
    /// All roles in display order.
    pub const ALL: [KeyRole; 4] = [
        KeyRole::Owner,
        KeyRole::Active,
        KeyRole::Posting,
        KeyRole::Memo,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_chain_names() {
        for name in ["alice", "steem.dao", "a-b-c", "user123"] {
            assert!(AccountKey::parse(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_names_that_could_escape_namespace() {
        for name in ["al", "Alice", "bob/wallet-view", "", "1abc", "averyveryverylongname"] {
            assert!(AccountKey::parse(name).is_err(), "{name}");
        }
    }

    #[test]
    fn serde_validates() {
        let ok: AccountKey = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<AccountKey>("\"x/y\"").is_err());
    }
}
