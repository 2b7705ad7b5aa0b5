use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{io::Write, path::Path};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    config::{self, ConfigError},
    model::{Transaction, DATE_FORMAT},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedLogEntry {
    pub date: String,
    pub id: String,
}

impl From<&Transaction> for ProcessedLogEntry {
    fn from(tx: &Transaction) -> Self {
        Self {
            date: tx.date.format(DATE_FORMAT).to_string(),
            id: tx.id.clone(),
        }
    }
}

/// Ids of transactions already emitted, keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedLog {
    entries: BTreeMap<String, ProcessedLogEntry>,
}

impl ProcessedLog {
    /// Later entries replace earlier ones with the same id.
    pub fn load(entries: impl IntoIterator<Item = ProcessedLogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let entries: Vec<ProcessedLogEntry> = serde_json::from_str(text)?;
        Ok(Self::load(entries))
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("{:?} missing, starting empty", path);
            return Ok(Self::default());
        }

        let text = config::read_to_string(path)?;
        let log = Self::from_json(&text).map_err(|source| ConfigError::Malformed {
            path: path.to_owned(),
            source,
        })?;

        if log.is_empty() {
            info!("{:?} empty", path);
        } else {
            info!("{} processed", log.len());
        }

        Ok(log)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn filter_new(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        transactions
            .into_iter()
            .filter(|tx| {
                let seen = self.contains(&tx.id);
                if seen {
                    debug!("{} already processed", tx.id);
                }
                !seen
            })
            .collect()
    }

    pub fn merge<'t>(&mut self, transactions: impl IntoIterator<Item = &'t Transaction>) {
        for tx in transactions {
            self.entries.insert(tx.id.clone(), tx.into());
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProcessedLogEntry> {
        self.entries.values()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries().collect::<Vec<_>>())
    }

    /// Replaces the file at `path` atomically; a failed write leaves the old
    /// log in place.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        info!("writing {} processed to {:?}", self.len(), path);

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(self.to_json()?.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path)?;

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionType;
    use anyhow::Result;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn tx(id: &str, day: u32) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            transaction_type: TransactionType::Debit,
            raw_type: Some("DEBIT".into()),
            amount: BigDecimal::from(10),
            id: id.into(),
            name: "ACME".into(),
            memo: None,
            account_name: "Checking".into(),
            category: None,
        }
    }

    fn ids(txs: &[Transaction]) -> Vec<&str> {
        txs.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_empty_inputs() -> Result<()> {
        assert!(ProcessedLog::from_json("")?.is_empty());
        assert!(ProcessedLog::from_json("  \n")?.is_empty());
        assert!(ProcessedLog::from_json("[]")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_malformed_is_an_error() {
        assert!(ProcessedLog::from_json("{").is_err());
        assert!(ProcessedLog::from_json(r#"[{"date": "2024/01/01"}]"#).is_err());
    }

    #[test]
    fn test_filter_new_preserves_order() -> Result<()> {
        let log = ProcessedLog::from_json(r#"[{"date": "2024/01/02", "id": "B"}]"#)?;

        let fresh = log.filter_new(vec![tx("C", 3), tx("B", 2), tx("A", 1)]);
        assert_eq!(ids(&fresh), vec!["C", "A"]);

        Ok(())
    }

    #[test]
    fn test_empty_log_passes_everything() {
        let log = ProcessedLog::default();
        let fresh = log.filter_new(vec![tx("A", 1), tx("B", 2)]);
        assert_eq!(ids(&fresh), vec!["A", "B"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let txs = vec![tx("A", 1), tx("B", 2)];

        let mut once = ProcessedLog::default();
        once.merge(&txs);

        let mut twice = once.clone();
        twice.merge(&txs);

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_merge_overwrites_by_id() {
        let mut log = ProcessedLog::load(vec![ProcessedLogEntry {
            date: "1999/12/31".into(),
            id: "A".into(),
        }]);
        log.merge(&[tx("A", 5)]);

        assert_eq!(
            log.entries().collect::<Vec<_>>(),
            vec![&ProcessedLogEntry {
                date: "2024/01/05".into(),
                id: "A".into()
            }]
        );
    }

    #[test]
    fn test_to_json() -> Result<()> {
        let mut log = ProcessedLog::default();
        log.merge(&[tx("B", 2), tx("A", 1)]);

        assert_eq!(
            log.to_json()?,
            r#"[{"date":"2024/01/01","id":"A"},{"date":"2024/01/02","id":"B"}]"#
        );

        Ok(())
    }

    #[test]
    fn test_read_missing_file_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(ProcessedLog::read(&dir.path().join("processed.json"))?.is_empty());

        Ok(())
    }

    #[test]
    fn test_read_malformed_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("processed.json");
        std::fs::write(&path, "not json")?;

        assert!(matches!(
            ProcessedLog::read(&path),
            Err(ConfigError::Malformed { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_write_then_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("processed.json");

        let mut log = ProcessedLog::default();
        log.merge(&[tx("A", 1), tx("B", 2)]);
        log.write(&path)?;

        let read = ProcessedLog::read(&path)?;
        assert_eq!(read, log);
        assert!(read.contains("A"));
        assert!(!read.contains("C"));

        Ok(())
    }

    #[test]
    fn test_write_replaces_whole_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("processed.json");
        std::fs::write(&path, format!("[{}]", "x".repeat(4096)))?;

        let mut log = ProcessedLog::default();
        log.merge(&[tx("A", 1)]);
        log.write(&path)?;

        assert_eq!(
            std::fs::read_to_string(&path)?,
            r#"[{"date":"2024/01/01","id":"A"}]"#
        );
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }

    #[test]
    fn test_failed_write_keeps_existing_log() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("processed.json");
        std::fs::write(&path, r#"[{"date":"2024/01/01","id":"A"}]"#)?;

        let mut log = ProcessedLog::default();
        log.merge(&[tx("B", 2)]);
        assert!(log.write(&dir.path().join("missing").join("processed.json")).is_err());

        assert_eq!(ProcessedLog::read(&path)?.len(), 1);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

        Ok(())
    }
}
