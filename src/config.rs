use chrono_tz::Tz;
use clap::Args;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{accounts::AccountNames, categories::CategoryRules};

pub const DEFAULT_TIMEZONE: &str = "Etc/GMT+7";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed {path}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Paths {
    /// Transactions already emitted by earlier runs.
    #[arg(long, global = true, default_value = "data/processed.json")]
    pub processed_filename: PathBuf,
    /// Ordered map of pattern to category, comments allowed.
    #[arg(long, global = true, default_value = "data/categories.jsonc")]
    pub categories_filename: PathBuf,
    /// Map of account id suffix to account name.
    #[arg(long, global = true, default_value = "data/accounts.json")]
    pub accounts_filename: PathBuf,
    /// Timezone transaction dates are reported in.
    #[arg(long, global = true, default_value = DEFAULT_TIMEZONE, value_parser = parse_timezone)]
    pub timezone: Tz,
}

fn parse_timezone(value: &str) -> Result<Tz, String> {
    value.parse::<Tz>().map_err(|e| e.to_string())
}

#[derive(Debug)]
pub struct Configuration {
    pub rules: CategoryRules,
    pub accounts: AccountNames,
    pub timezone: Tz,
}

impl Configuration {
    pub fn load(paths: &Paths) -> Result<Self, ConfigError> {
        let rules: CategoryRules = read_jsonc(&paths.categories_filename)?;
        let accounts: AccountNames = read_jsonc(&paths.accounts_filename)?;

        info!(
            "{} category rules, {} account names",
            rules.len(),
            accounts.len()
        );

        for rule in rules.iter() {
            debug!("{:?} => {:?}", rule.pattern(), rule.category());
        }

        if rules.is_empty() {
            warn!("no category rules, everything is uncategorized");
        }

        if accounts.is_empty() {
            warn!("no account names, raw account ids are used");
        }

        Ok(Self {
            rules,
            accounts,
            timezone: paths.timezone,
        })
    }
}

pub fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    debug!("reading {:?}", path);

    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

pub fn read_jsonc<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = read_to_string(path)?;
    crate::jsonc::from_str(&text).map_err(|source| ConfigError::Malformed {
        path: path.to_owned(),
        source,
    })
}
