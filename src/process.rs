use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::{io::Write, path::PathBuf, time::Instant};
use tracing::*;

use crate::{
    config::{Configuration, Paths},
    pipeline::Pipeline,
    processed::ProcessedLog,
    statement,
};

#[derive(Debug, Args)]
pub struct Command {
    /// OFX or QFX statement to process.
    pub filename: PathBuf,
    /// Record emitted transactions so later runs skip them.
    #[arg(short = 'w', long)]
    pub update_processed_file: bool,
    /// Print every field of each transaction.
    #[arg(long)]
    pub debug: bool,
}

pub fn execute_command(paths: &Paths, cmd: &Command) -> Result<()> {
    process(paths, cmd, &mut std::io::stdout().lock())
}

fn process(paths: &Paths, cmd: &Command, out: &mut impl Write) -> Result<()> {
    let started = Instant::now();

    let (config, log) = {
        let _span = span!(Level::INFO, "loading").entered();
        let config = Configuration::load(paths)?;
        let log = ProcessedLog::read(&paths.processed_filename)?;
        (config, log)
    };

    let statement = statement::read(&cmd.filename)
        .with_context(|| format!("reading statement {:?}", cmd.filename))?;

    let run = Pipeline::new(&config)
        .run(&statement, log)
        .with_context(|| format!("normalizing {:?}", cmd.filename))?;

    for tx in run.emitted.iter() {
        let line = tx.render(cmd.debug);
        if tx.is_categorized() {
            writeln!(out, "{}", line)?;
        } else {
            writeln!(out, "{}", line.red())?;
        }
    }

    info!(
        "{} emitted, {} uncategorized, {} skipped in {:?}",
        run.emitted.len(),
        run.uncategorized(),
        run.skipped + run.duplicates,
        Instant::now() - started
    );

    if cmd.update_processed_file {
        run.log
            .write(&paths.processed_filename)
            .with_context(|| format!("writing {:?}", paths.processed_filename))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const STATEMENT: &str = r#"OFXHEADER:100
DATA:OFXSGML
VERSION:102

<OFX>
<BANKMSGSRSV1>
<STMTTRNRS>
<STMTRS>
<CURDEF>USD
<BANKACCTFROM>
<BANKID>121000248
<ACCTID>000112345
<ACCTTYPE>CHECKING
</BANKACCTFROM>
<BANKTRANLIST>
<STMTTRN>
<TRNTYPE>DEBIT
<DTPOSTED>20240104120000.000[0:GMT]
<TRNAMT>-42.50
<FITID>TXN001
<NAME>ACME STORE #4
<MEMO>none
</STMTTRN>
<STMTTRN>
<TRNTYPE>CREDIT
<DTPOSTED>20240115120000.000[0:GMT]
<TRNAMT>1500.00
<FITID>TXN002
<NAME>PAYROLL ACME CORP
<MEMO>none
</STMTTRN>
</BANKTRANLIST>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>
"#;

    fn setup(dir: &Path) -> Result<(Paths, PathBuf)> {
        let paths = Paths {
            processed_filename: dir.join("processed.json"),
            categories_filename: dir.join("categories.jsonc"),
            accounts_filename: dir.join("accounts.json"),
            timezone: chrono_tz::Etc::GMTPlus7,
        };
        std::fs::write(
            &paths.categories_filename,
            "{\n  // income\n  \"PAYROLL\": \"Income\",\n}\n",
        )?;
        std::fs::write(&paths.accounts_filename, r#"{"2345": "Checking"}"#)?;

        let filename = dir.join("statement.qfx");
        std::fs::write(&filename, STATEMENT)?;

        Ok((paths, filename))
    }

    fn command(filename: &Path, update_processed_file: bool) -> Command {
        Command {
            filename: filename.to_owned(),
            update_processed_file,
            debug: false,
        }
    }

    fn lines(out: Vec<u8>) -> Result<Vec<String>> {
        Ok(String::from_utf8(out)?.lines().map(|l| l.to_owned()).collect())
    }

    #[test]
    fn test_process_twice_with_persistence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (paths, filename) = setup(dir.path())?;
        let cmd = command(&filename, true);

        let mut out = Vec::new();
        process(&paths, &cmd, &mut out)?;
        let first = lines(out)?;
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("2024/01/04\t$42.50\t\tnone\tChecking\tACME STORE #4"));
        assert!(first[1].contains("2024/01/15\t\t$1500.00\tIncome\tChecking\tPAYROLL ACME CORP"));

        let mut out = Vec::new();
        process(&paths, &cmd, &mut out)?;
        assert!(lines(out)?.is_empty());

        let log = ProcessedLog::read(&paths.processed_filename)?;
        assert_eq!(log.len(), 2);

        Ok(())
    }

    #[test]
    fn test_process_without_persistence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (paths, filename) = setup(dir.path())?;
        let cmd = command(&filename, false);

        for _ in 0..2 {
            let mut out = Vec::new();
            process(&paths, &cmd, &mut out)?;
            assert_eq!(lines(out)?.len(), 2);
        }
        assert!(!paths.processed_filename.exists());

        Ok(())
    }

    #[test]
    fn test_process_debug_rendering() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (paths, filename) = setup(dir.path())?;
        let mut cmd = command(&filename, false);
        cmd.debug = true;

        let mut out = Vec::new();
        process(&paths, &cmd, &mut out)?;
        let lines = lines(out)?;
        assert!(lines[0].contains("id=TXN001"));
        assert!(lines[1].contains("category=Some(\"Income\")"));

        Ok(())
    }

    #[test]
    fn test_malformed_log_aborts_without_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (paths, filename) = setup(dir.path())?;
        std::fs::write(&paths.processed_filename, "{broken")?;

        let mut out = Vec::new();
        assert!(process(&paths, &command(&filename, true), &mut out).is_err());
        assert!(out.is_empty());
        assert_eq!(std::fs::read_to_string(&paths.processed_filename)?, "{broken");

        Ok(())
    }

    #[test]
    fn test_bad_record_aborts_without_output() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (paths, filename) = setup(dir.path())?;
        std::fs::write(&filename, STATEMENT.replace("1500.00", "lots"))?;

        let mut out = Vec::new();
        assert!(process(&paths, &command(&filename, true), &mut out).is_err());
        assert!(out.is_empty());
        assert!(!paths.processed_filename.exists());

        Ok(())
    }
}
