use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Display names keyed by the trailing digits of an account id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct AccountNames {
    // Longest suffix first so the most specific entry wins.
    suffixes: Vec<(String, String)>,
}

impl From<BTreeMap<String, String>> for AccountNames {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self {
            suffixes: map
                .into_iter()
                .filter(|(_, name)| !name.is_empty())
                .sorted_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)))
                .collect(),
        }
    }
}

impl AccountNames {
    pub fn resolve<'a>(&'a self, account_id: &'a str) -> &'a str {
        self.suffixes
            .iter()
            .find(|(suffix, _)| account_id.ends_with(suffix.as_str()))
            .map_or(account_id, |(_, name)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}
