use anyhow::{Context, Result};
use clap::Args;
use std::{io::Write, path::PathBuf};

use crate::{
    config::{Configuration, Paths},
    pipeline::Pipeline,
    statement,
};

#[derive(Debug, Args)]
pub struct Command {
    pub filename: PathBuf,
    #[arg(short, long)]
    pub json: bool,
}

pub fn execute_command(paths: &Paths, cmd: &Command) -> Result<()> {
    dump(paths, cmd, &mut std::io::stdout().lock())
}

fn dump(paths: &Paths, cmd: &Command, out: &mut impl Write) -> Result<()> {
    let config = Configuration::load(paths)?;

    let statement = statement::read(&cmd.filename)
        .with_context(|| format!("reading statement {:?}", cmd.filename))?;

    let transactions = Pipeline::new(&config).prepare(&statement)?;

    if cmd.json {
        serde_json::to_writer(&mut *out, &transactions)?;
        writeln!(out)?;
    } else {
        for tx in transactions.iter() {
            writeln!(out, "{}", tx.render(true))?;
        }
    }

    Ok(())
}
