//! Bank SMS parsing.
//!
//! Turns the text of a bank notification into the credited amount and its
//! 12-digit UTR. Anything that looks like a debit, or that lacks either
//! value, yields `None`: an unparsed credit is merely ignored, while a debit
//! read as a credit would mint money.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::money::to_paise;

/// Debit wording. Checked before any credit wording.
const DEBIT_KEYWORDS: &[&str] = &[
    "debited",
    "deducted",
    "sent to",
    "paid to",
    "transfer to",
    "withdrawn",
    "payment of",
];

const CREDIT_KEYWORDS: &[&str] = &["credited", "received", "deposited", "added to", "credit"];

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:rs\.?|inr|amt|amount|with)\s*[:.]?\s*(?:(?:rs\.?|inr)\s*)?([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
    )
    .expect("amount pattern is valid")
});

static LABELLED_UTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:upi|ref|utr|cms|imps|no|id)\D{0,20}?(\d{12})(?:\D|$)")
        .expect("labelled UTR pattern is valid")
});

static BARE_UTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{12})(?:\D|$)").expect("bare UTR pattern is valid"));

/// A credit extracted from an SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCredit {
    pub amount_paise: i64,
    pub utr: String,
}

/// Parse a bank SMS. Pure and deterministic.
pub fn parse(raw_text: &str) -> Option<ParsedCredit> {
    let lower = raw_text.to_lowercase();

    if DEBIT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }
    if !CREDIT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }

    let amount_paise = extract_amount(raw_text)?;
    let utr = extract_utr(raw_text)?;
    Some(ParsedCredit { amount_paise, utr })
}

fn extract_amount(text: &str) -> Option<i64> {
    AMOUNT.captures_iter(text).find_map(|caps| {
        let digits = caps.get(1)?.as_str().replace(',', "");
        let amount = Decimal::from_str(&digits).ok()?;
        to_paise(amount).filter(|paise| *paise > 0)
    })
}

fn extract_utr(text: &str) -> Option<String> {
    LABELLED_UTR
        .captures(text)
        .or_else(|| BARE_UTR.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
