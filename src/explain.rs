use anyhow::Result;
use clap::Args;
use std::io::Write;

use crate::{
    categories::CategoryRules,
    config::{self, Paths},
    model::UNCATEGORIZED,
};

#[derive(Debug, Args)]
pub struct Command {
    /// Transaction name as the bank reports it.
    pub name: String,
    #[arg(short, long)]
    pub memo: Option<String>,
}

pub fn execute_command(paths: &Paths, cmd: &Command) -> Result<()> {
    let rules: CategoryRules = config::read_jsonc(&paths.categories_filename)?;

    explain(&rules, cmd, &mut std::io::stdout().lock())
}

fn explain(rules: &CategoryRules, cmd: &Command, out: &mut impl Write) -> Result<()> {
    match rules.find(&cmd.name, cmd.memo.as_deref()) {
        Some(rule) => writeln!(out, "{}\t{}", rule.category(), rule.pattern())?,
        None => writeln!(out, "{}", UNCATEGORIZED)?,
    }

    Ok(())
}
