use std::collections::HashSet;
use tracing::*;

use crate::{
    config::Configuration,
    model::{NormalizeError, Transaction},
    processed::ProcessedLog,
    statement::Statement,
};

/// Outcome of one run: new transactions in statement order and the log with
/// them merged in.
#[derive(Debug)]
pub struct Run {
    pub emitted: Vec<Transaction>,
    pub log: ProcessedLog,
    pub skipped: usize,
    pub duplicates: usize,
}

impl Run {
    pub fn uncategorized(&self) -> usize {
        self.emitted.iter().filter(|tx| !tx.is_categorized()).count()
    }
}

pub struct Pipeline<'c> {
    config: &'c Configuration,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c Configuration) -> Self {
        Self { config }
    }

    fn decode(&self, statement: &Statement) -> Result<Vec<Transaction>, NormalizeError> {
        statement
            .records
            .iter()
            .map(|r| Transaction::decode(r, &self.config.timezone))
            .collect()
    }

    fn classify(&self, mut tx: Transaction, account_name: &str) -> Transaction {
        tx.account_name = account_name.to_owned();
        tx.category = self.config.rules.categorize(&tx).map(|c| c.to_owned());
        tx
    }

    /// Every transaction in the statement, categorized, ignoring the log.
    pub fn prepare(&self, statement: &Statement) -> Result<Vec<Transaction>, NormalizeError> {
        let account_name = self.config.accounts.resolve(&statement.account_id);

        Ok(self
            .decode(statement)?
            .into_iter()
            .map(|tx| self.classify(tx, account_name))
            .collect())
    }

    pub fn run(&self, statement: &Statement, log: ProcessedLog) -> Result<Run, NormalizeError> {
        let _span = span!(Level::INFO, "run").entered();

        let account_name = self.config.accounts.resolve(&statement.account_id);
        debug!("account {:?} is {:?}", statement.account_id, account_name);

        // Nothing is emitted unless every record decodes.
        let decoded = self.decode(statement)?;
        let total = decoded.len();

        let fresh = log.filter_new(decoded);
        let skipped = total - fresh.len();

        let mut log = log;
        let mut seen = HashSet::new();
        let mut emitted = Vec::with_capacity(fresh.len());
        let mut duplicates = 0;

        for tx in fresh {
            if !seen.insert(tx.id.clone()) {
                warn!("{} repeated in statement, emitting once", tx.id);
                duplicates += 1;
                continue;
            }

            let tx = self.classify(tx, account_name);
            log.merge([&tx]);
            emitted.push(tx);
        }

        Ok(Run {
            emitted,
            log,
            skipped,
            duplicates,
        })
    }
}
