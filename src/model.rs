use bigdecimal::{BigDecimal, ParseBigDecimalError, Signed};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{ser::SerializeStruct, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::statement::{RawField, RawRecord};

pub const UNKNOWN_ACCOUNT: &str = "UNKNOWN";

/// Banks write this instead of leaving MEMO out.
pub const NO_MEMO: &str = "none";

pub const UNCATEGORIZED: &str = "none";

pub const DATE_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "DEBIT",
            TransactionType::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("transaction {id}: missing {field}")]
    MissingField { id: String, field: &'static str },
    #[error("transaction {id}: invalid posted date {value:?}")]
    InvalidDate { id: String, value: String },
    #[error("transaction {id}: invalid amount {value:?}")]
    InvalidAmount {
        id: String,
        value: String,
        #[source]
        source: ParseBigDecimalError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    pub raw_type: Option<String>,
    pub amount: BigDecimal,
    pub id: String,
    pub name: String,
    pub memo: Option<String>,
    pub account_name: String,
    pub category: Option<String>,
}

#[derive(Default)]
struct BuildingTransaction<'r> {
    raw_type: Option<&'r str>,
    posted: Option<&'r str>,
    amount: Option<&'r str>,
    id: Option<&'r str>,
    name: Option<&'r str>,
    memo: Option<&'r str>,
}

impl Transaction {
    /// Builds a normalized transaction from a statement record. The first
    /// occurrence of a field wins.
    pub fn decode(record: &RawRecord, timezone: &Tz) -> Result<Self, NormalizeError> {
        let mut building = BuildingTransaction::default();

        for field in record.fields.iter() {
            let (slot, value) = match field {
                RawField::Type(v) => (&mut building.raw_type, v),
                RawField::Posted(v) => (&mut building.posted, v),
                RawField::Amount(v) => (&mut building.amount, v),
                RawField::Id(v) => (&mut building.id, v),
                RawField::Name(v) => (&mut building.name, v),
                RawField::Memo(v) => (&mut building.memo, v),
                RawField::Other(_, _) => continue,
            };
            slot.get_or_insert(value.as_str());
        }

        let id = building.id.ok_or_else(|| NormalizeError::MissingField {
            id: "?".to_owned(),
            field: "id",
        })?;

        let posted = building.posted.ok_or_else(|| NormalizeError::MissingField {
            id: id.to_owned(),
            field: "posted date",
        })?;

        let amount = building.amount.ok_or_else(|| NormalizeError::MissingField {
            id: id.to_owned(),
            field: "amount",
        })?;

        let date = normalize_posted(posted, timezone).ok_or_else(|| NormalizeError::InvalidDate {
            id: id.to_owned(),
            value: posted.to_owned(),
        })?;

        let amount = BigDecimal::from_str(amount.trim()).map_err(|source| {
            NormalizeError::InvalidAmount {
                id: id.to_owned(),
                value: amount.to_owned(),
                source,
            }
        })?;

        let raw_type = building.raw_type.map(|t| t.to_owned());
        let transaction_type = derive_type(&amount, raw_type.as_deref());

        Ok(Transaction {
            date,
            transaction_type,
            raw_type,
            amount: amount.abs(),
            id: id.to_owned(),
            name: building.name.unwrap_or_default().to_owned(),
            memo: building
                .memo
                .filter(|m| *m != NO_MEMO)
                .map(|m| m.to_owned()),
            account_name: UNKNOWN_ACCOUNT.to_owned(),
            category: None,
        })
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }

    pub fn outflow(&self) -> Option<&BigDecimal> {
        match self.transaction_type {
            TransactionType::Debit => Some(&self.amount),
            TransactionType::Credit => None,
        }
    }

    pub fn inflow(&self) -> Option<&BigDecimal> {
        match self.transaction_type {
            TransactionType::Debit => None,
            TransactionType::Credit => Some(&self.amount),
        }
    }

    pub fn render(&self, verbose: bool) -> String {
        if verbose {
            format!(
                "date={} type={} raw_type={} amount={} id={} name={:?} memo={:?} account={:?} category={:?}",
                self.date.format(DATE_FORMAT),
                self.transaction_type,
                self.raw_type.as_deref().unwrap_or("-"),
                to_money(&self.amount),
                self.id,
                self.name,
                self.memo,
                self.account_name,
                self.category,
            )
        } else {
            self.to_string()
        }
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.date.format(DATE_FORMAT),
            self.outflow().map(to_money).unwrap_or_default(),
            self.inflow().map(to_money).unwrap_or_default(),
            self.category.as_deref().unwrap_or(UNCATEGORIZED),
            self.account_name,
            self.name
        )
    }
}

impl Serialize for Transaction {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Transaction", 9)?;
        state.serialize_field("date", &self.date.format(DATE_FORMAT).to_string())?;
        state.serialize_field("transaction_type", self.transaction_type.as_str())?;
        state.serialize_field("raw_type", &self.raw_type)?;
        state.serialize_field("amount", &to_amount(&self.amount))?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("memo", &self.memo)?;
        state.serialize_field("account_name", &self.account_name)?;
        state.serialize_field("category", &self.category)?;
        state.end()
    }
}

/// Rounds to cents and always prints both decimal places.
pub fn to_amount(value: &BigDecimal) -> String {
    let (cents, _) = value.round(2).with_scale(2).as_bigint_and_exponent();
    let sign = if cents.is_negative() { "-" } else { "" };
    let cents = cents.abs();
    format!("{}{}.{:02}", sign, &cents / 100u32, &cents % 100u32)
}

pub fn to_money(value: &BigDecimal) -> String {
    format!("${}", to_amount(value))
}

/// A positive amount is always a credit, whatever the bank called it.
fn derive_type(amount: &BigDecimal, raw_type: Option<&str>) -> TransactionType {
    if amount.is_positive() {
        return TransactionType::Credit;
    }
    match raw_type {
        Some(t) if t.eq_ignore_ascii_case("CREDIT") => TransactionType::Credit,
        _ => TransactionType::Debit,
    }
}

/// Parses an OFX timestamp (`YYYYMMDD[HHMM[SS[.XXX]]][[offset[:TZ]]]`) and
/// returns the calendar date it falls on in `timezone`. Timestamps without an
/// offset are GMT.
pub fn normalize_posted(raw: &str, timezone: &Tz) -> Option<NaiveDate> {
    lazy_static! {
        static ref POSTED: Regex = Regex::new(concat!(
            r"^(?P<y>\d{4})(?P<m>\d{2})(?P<d>\d{2})",
            r"(?:(?P<hh>\d{2})(?P<mm>\d{2})(?:(?P<ss>\d{2})(?:\.\d+)?)?)?",
            r"\s*(?:\[\s*(?P<sign>[+-]?)(?P<oh>\d{1,2})(?:\.(?P<of>\d{1,2}))?(?::[^\]]*)?\])?$"
        ))
        .unwrap();
    }

    let caps = POSTED.captures(raw.trim())?;
    let number = |name: &str| -> Option<u32> {
        caps.name(name)
            .map_or(Some(0), |m| m.as_str().parse::<u32>().ok())
    };

    let date = NaiveDate::from_ymd_opt(number("y")? as i32, number("m")?, number("d")?)?;
    let time = NaiveTime::from_hms_opt(number("hh")?, number("mm")?, number("ss")?)?;

    let offset_seconds = {
        let hours = number("oh")? as i32 * 3600;
        let fraction = match caps.name("of") {
            Some(m) => {
                let digits = m.as_str();
                digits.parse::<i32>().ok()? * 3600 / 10i32.pow(digits.len() as u32)
            }
            None => 0,
        };
        match caps.name("sign").map(|m| m.as_str()) {
            Some("-") => -(hours + fraction),
            _ => hours + fraction,
        }
    };

    let offset = FixedOffset::east_opt(offset_seconds)?;
    let posted = offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()?;

    Some(posted.with_timezone(timezone).date_naive())
}
