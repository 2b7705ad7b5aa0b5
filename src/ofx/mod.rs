use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while1},
    character::complete::char,
    combinator::{map, recognize},
    multi::many0,
    sequence::{delimited, tuple},
    IResult,
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::borrow::Cow;
use tracing::debug;

use crate::statement::{RawField, RawRecord, Statement, StatementError};


#[derive(Debug, PartialEq)]
enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Text(&'a str),
    Ignored,
}

fn element_name(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')(i)
}

fn open_element(i: &str) -> IResult<&str, Token> {
    map(delimited(char('<'), element_name, char('>')), Token::Open)(i)
}

fn close_element(i: &str) -> IResult<&str, Token> {
    map(delimited(tag("</"), element_name, char('>')), Token::Close)(i)
}

// Processing instructions and comments, OFX 2 files carry a few of these.
fn ignored(i: &str) -> IResult<&str, Token> {
    map(
        alt((
            recognize(tuple((tag("<?"), take_until("?>"), tag("?>")))),
            recognize(tuple((tag("<!--"), take_until("-->"), tag("-->")))),
        )),
        |_| Token::Ignored,
    )(i)
}

fn text(i: &str) -> IResult<&str, Token> {
    map(is_not("<"), Token::Text)(i)
}

fn token(i: &str) -> IResult<&str, Token> {
    alt((close_element, ignored, open_element, text))(i)
}

/// Decodes named and numeric character references in one pass, so `&amp;#39;`
/// stays `&#39;`. References that don't name a character are left alone.
fn unescape(value: &str) -> Cow<str> {
    lazy_static! {
        static ref ENTITY: Regex =
            Regex::new(r"&(?:#(?P<dec>[0-9]{1,7})|#[xX](?P<hex>[0-9a-fA-F]{1,6})|(?P<name>lt|gt|quot|apos|amp));")
                .unwrap();
    }

    ENTITY.replace_all(value, |caps: &Captures| {
        let decoded = match (caps.name("dec"), caps.name("hex"), caps.name("name")) {
            (Some(dec), _, _) => dec.as_str().parse::<u32>().ok().and_then(char::from_u32),
            (_, Some(hex), _) => u32::from_str_radix(hex.as_str(), 16)
                .ok()
                .and_then(char::from_u32),
            (_, _, Some(name)) => match name.as_str() {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => Some('&'),
            },
            _ => None,
        };
        decoded.map_or_else(|| caps[0].to_owned(), |c| c.to_string())
    })
}

fn to_field(name: &str, value: String) -> RawField {
    match name.to_ascii_uppercase().as_str() {
        "TRNTYPE" => RawField::Type(value),
        "DTPOSTED" => RawField::Posted(value),
        "TRNAMT" => RawField::Amount(value),
        "FITID" => RawField::Id(value),
        "NAME" => RawField::Name(value),
        "MEMO" => RawField::Memo(value),
        _ => RawField::Other(name.to_owned(), value),
    }
}

/// Skips the OFX header block, SGML and XML files both start the body at `<OFX>`.
fn body(data: &str) -> Result<&str, StatementError> {
    data.to_ascii_uppercase()
        .find("<OFX>")
        .map(|start| &data[start..])
        .ok_or_else(|| StatementError::Malformed("no <OFX> element".to_owned()))
}

pub fn parse_str(data: &str) -> Result<Statement, StatementError> {
    let (rest, tokens) =
        many0(token)(body(data)?).map_err(|e| StatementError::Malformed(e.to_string()))?;

    if !rest.trim().is_empty() {
        return Err(StatementError::Malformed(format!(
            "unexpected input near {:?}",
            rest.chars().take(32).collect::<String>()
        )));
    }

    let mut account_id: Option<String> = None;
    let mut records = Vec::new();
    let mut building: Option<Vec<RawField>> = None;
    let mut element: Option<&str> = None;

    for token in tokens {
        match token {
            Token::Open(name) if name.eq_ignore_ascii_case("STMTTRN") => {
                if let Some(fields) = building.replace(Vec::new()) {
                    records.push(RawRecord::new(fields));
                }
                element = None;
            }
            Token::Open(name) => element = Some(name),
            Token::Close(name) => {
                if name.eq_ignore_ascii_case("STMTTRN") {
                    if let Some(fields) = building.take() {
                        records.push(RawRecord::new(fields));
                    }
                }
                element = None;
            }
            Token::Text(text) => {
                let value = unescape(text.trim()).into_owned();
                match element.take() {
                    Some(name) if !value.is_empty() => {
                        if account_id.is_none() && name.eq_ignore_ascii_case("ACCTID") {
                            account_id = Some(value.clone());
                        }
                        if let Some(fields) = building.as_mut() {
                            fields.push(to_field(name, value));
                        }
                    }
                    _ => {}
                }
            }
            Token::Ignored => {}
        }
    }

    if let Some(fields) = building.take() {
        records.push(RawRecord::new(fields));
    }

    let account_id = account_id.ok_or(StatementError::MissingField("ACCTID"))?;

    debug!("{} records for account {}", records.len(), account_id);

    Ok(Statement {
        account_id,
        records,
    })
}
