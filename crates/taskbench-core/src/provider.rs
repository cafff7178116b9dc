//! Provider selection by key.
//!
//! Search, sandbox, browser and memory providers run inside the agent process.
//! The harness only picks them by key and hands the choice to the agent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSlot {
    Search,
    Sandbox,
    Browser,
    Memory,
}

impl ProviderSlot {
    pub const ALL: [ProviderSlot; 4] = [
        ProviderSlot::Search,
        ProviderSlot::Sandbox,
        ProviderSlot::Browser,
        ProviderSlot::Memory,
    ];

    /// Environment variable the agent process reads the key from.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Search => "TASKBENCH_SEARCH_PROVIDER",
            Self::Sandbox => "TASKBENCH_SANDBOX_PROVIDER",
            Self::Browser => "TASKBENCH_BROWSER_PROVIDER",
            Self::Memory => "TASKBENCH_MEMORY_PROVIDER",
        }
    }
}

impl fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Sandbox => write!(f, "sandbox"),
            Self::Browser => write!(f, "browser"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for ProviderSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "sandbox" => Ok(Self::Sandbox),
            "browser" => Ok(Self::Browser),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("invalid provider slot: {s}")),
        }
    }
}

/// Provider key per slot. Unset slots are left to the agent's own default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSelection {
    keys: BTreeMap<ProviderSlot, String>,
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

impl ProviderSelection {
    /// Build from `(slot, key)` pairs, rejecting unknown slots and malformed keys.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> BenchResult<Self> {
        let mut selection = Self::default();
        for (slot, key) in pairs {
            let slot: ProviderSlot = slot.parse().map_err(BenchError::Config)?;
            selection.set(slot, key)?;
        }
        Ok(selection)
    }

    pub fn set(&mut self, slot: ProviderSlot, key: &str) -> BenchResult<()> {
        let key = key.trim();
        if !valid_key(key) {
            return Err(BenchError::Config(format!(
                "invalid {slot} provider key: {key:?}"
            )));
        }
        self.keys.insert(slot, key.to_string());
        Ok(())
    }

    pub fn get(&self, slot: ProviderSlot) -> Option<&str> {
        self.keys.get(&slot).map(String::as_str)
    }

    pub fn env_vars(&self) -> Vec<(&'static str, &str)> {
        self.keys
            .iter()
            .map(|(slot, key)| (slot.env_var(), key.as_str()))
            .collect()
    }

    /// One-line summary, e.g. `search=exa, sandbox=e2b`, or `default` when empty.
    pub fn summary(&self) -> String {
        if self.keys.is_empty() {
            return "default".to_string();
        }
        self.keys
            .iter()
            .map(|(slot, key)| format!("{slot}={key}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_summary_and_env() {
        let selection =
            ProviderSelection::from_pairs([("sandbox", "e2b"), ("search", "exa")]).unwrap();
        assert_eq!(selection.summary(), "search=exa, sandbox=e2b");
        assert_eq!(
            selection.env_vars(),
            vec![
                ("TASKBENCH_SEARCH_PROVIDER", "exa"),
                ("TASKBENCH_SANDBOX_PROVIDER", "e2b"),
            ]
        );
        assert_eq!(selection.get(ProviderSlot::Browser), None);
    }

    #[test]
    fn test_empty_selection_summary() {
        assert_eq!(ProviderSelection::default().summary(), "default");
    }

    #[test]
    fn test_rejects_bad_slot_and_key() {
        assert!(ProviderSelection::from_pairs([("email", "x")]).is_err());
        assert!(ProviderSelection::from_pairs([("search", "")]).is_err());
        assert!(ProviderSelection::from_pairs([("search", "a b")]).is_err());
    }

    #[test]
    fn test_slot_round_trip() {
        for slot in ProviderSlot::ALL {
            assert_eq!(slot.to_string().parse::<ProviderSlot>().unwrap(), slot);
        }
    }
}
