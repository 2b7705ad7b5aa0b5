use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{info, warn};

/// A single tagged value from a statement record.
#[derive(Debug, Clone, PartialEq)]
pub enum RawField {
    Type(String),
    Posted(String),
    Amount(String),
    Id(String),
    Name(String),
    Memo(String),
    Other(String, String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub fields: Vec<RawField>,
}

impl RawRecord {
    pub fn new(fields: Vec<RawField>) -> Self {
        Self { fields }
    }
}

/// Everything the pipeline needs from a statement file.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub account_id: String,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("unable to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported statement format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("malformed statement: {0}")]
    Malformed(String),
    #[error("missing {0} in statement")]
    MissingField(&'static str),
}

pub fn read(path: &Path) -> Result<Statement, StatementError> {
    info!("parsing {:?}", path);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("ofx") | Some("qfx") => {
            let data = std::fs::read(path).map_err(|source| StatementError::Io {
                path: path.to_owned(),
                source,
            })?;
            crate::ofx::parse_str(&decode(&data, path))
        }
        _ => Err(StatementError::UnsupportedFormat(path.to_owned())),
    }
}

fn decode<'d>(data: &'d [u8], path: &Path) -> Cow<'d, str> {
    let text = String::from_utf8_lossy(data);
    if let Cow::Owned(_) = text {
        warn!(
            "{:?} is not valid UTF-8, {} characters replaced",
            path,
            text.matches(char::REPLACEMENT_CHARACTER).count()
        );
    }
    text
}
