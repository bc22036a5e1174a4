//! Invoice arithmetic and status rules.
//!
//! Money is held in integer cents, quantities in hundredths and tax rates in
//! basis points, so every total is exact and rounding happens in one place.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
    #[error("invalid tax rate '{0}'")]
    InvalidTaxRate(String),
    #[error("line {0}: description is required")]
    MissingDescription(usize),
    #[error("line {0}: quantity must be greater than zero")]
    InvalidQuantity(usize),
    #[error("line {0}: amount is too large")]
    LineTooLarge(usize),
    #[error("invoice total is too large")]
    TotalTooLarge,
    #[error("an invoice needs at least one line item")]
    NoLineItems,
    #[error("invoice must be draft to edit")]
    NotDraft,
    #[error("cannot {action} an invoice that is {from}")]
    InvalidTransition {
        from: InvoiceStatus,
        action: InvoiceAction,
    },
    #[error("unknown invoice status '{0}'")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Void,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn ensure_editable(&self) -> Result<(), InvoiceError> {
        if *self == InvoiceStatus::Draft {
            Ok(())
        } else {
            Err(InvoiceError::NotDraft)
        }
    }

    pub fn apply(self, action: InvoiceAction) -> Result<InvoiceStatus, InvoiceError> {
        use InvoiceAction::*;
        use InvoiceStatus::*;
        match (self, action) {
            (Draft, Send) => Ok(Sent),
            (Sent, Pay) => Ok(Paid),
            (Draft | Sent, InvoiceAction::Void) => Ok(InvoiceStatus::Void),
            (from, action) => Err(InvoiceError::InvalidTransition { from, action }),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = InvoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvoiceError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceAction {
    Send,
    Pay,
    Void,
}

impl fmt::Display for InvoiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvoiceAction::Send => "send",
            InvoiceAction::Pay => "pay",
            InvoiceAction::Void => "void",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    /// Hundredths of a unit.
    pub quantity: i64,
    /// Cents.
    pub unit_price: i64,
}

impl LineItem {
    /// Line total in cents, `None` when it does not fit an `i64`.
    pub fn total(&self) -> Option<i64> {
        self.quantity
            .checked_mul(self.unit_price)
            .and_then(|cents| div_round_half_up(cents, 100))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
}

pub fn compute_totals(items: &[LineItem], tax_rate_bp: i64) -> Result<Totals, InvoiceError> {
    let mut subtotal: i64 = 0;
    for (index, item) in items.iter().enumerate() {
        subtotal = item
            .total()
            .and_then(|line| subtotal.checked_add(line))
            .ok_or(InvoiceError::LineTooLarge(index + 1))?;
    }
    let tax = subtotal
        .checked_mul(tax_rate_bp)
        .and_then(|bp| div_round_half_up(bp, 10_000))
        .ok_or(InvoiceError::TotalTooLarge)?;
    Ok(Totals {
        subtotal,
        tax,
        total: subtotal.checked_add(tax).ok_or(InvoiceError::TotalTooLarge)?,
    })
}

fn div_round_half_up(numerator: i64, denominator: i64) -> Option<i64> {
    let half = denominator / 2;
    if numerator >= 0 {
        numerator.checked_add(half).map(|n| n / denominator)
    } else {
        numerator.checked_sub(half).map(|n| n / denominator)
    }
}

/// Parse a non-negative decimal with at most two fractional digits into
/// hundredths (`"12.5"` → `1250`).
pub fn parse_amount(input: &str) -> Result<i64, InvoiceError> {
    let raw = input.trim().replace(',', ".");
    let invalid = || InvoiceError::InvalidAmount(input.to_string());

    let (whole, fraction) = raw.split_once('.').unwrap_or((raw.as_str(), ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > 2
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

/// Percentage to basis points (`"5.5"` → `550`), capped at 100%.
pub fn parse_tax_rate(input: &str) -> Result<i64, InvoiceError> {
    if input.trim().is_empty() {
        return Ok(0);
    }
    let bp = parse_amount(input).map_err(|_| InvoiceError::InvalidTaxRate(input.to_string()))?;
    if bp > 10_000 {
        return Err(InvoiceError::InvalidTaxRate(input.to_string()));
    }
    Ok(bp)
}

pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

pub fn format_money(cents: i64, currency: &str) -> String {
    format!("{} {}", format_amount(cents), currency)
}

pub fn format_rate(bp: i64) -> String {
    let whole = bp / 100;
    match bp % 100 {
        0 => format!("{whole}%"),
        frac if frac % 10 == 0 => format!("{whole}.{}%", frac / 10),
        frac => format!("{whole}.{frac:02}%"),
    }
}

/// `INV-<year>-<seq>` with the sequence zero-padded to four digits.
pub fn invoice_number(year: i32, sequence: u64) -> String {
    format!("INV-{year}-{sequence:04}")
}

/// One past the highest sequence already issued for `year`. Deleted drafts
/// leave gaps, so counting the numbers would hand out a duplicate.
pub fn next_sequence<S: AsRef<str>>(year: i32, issued: &[S]) -> u64 {
    let prefix = format!("INV-{year}-");
    issued
        .iter()
        .filter_map(|number| number.as_ref().strip_prefix(&prefix)?.parse::<u64>().ok())
        .max()
        .map_or(1, |highest| highest.saturating_add(1))
}

#[derive(Default)]
struct PartialItem {
    description: String,
    quantity: String,
    unit_price: String,
}

/// Collect `items[<n>][description|quantity|unit_price]` form fields.
///
/// Rows where every field is blank are skipped (the form always renders a
/// spare row). Line numbers in errors are 1-based.
pub fn parse_line_items(pairs: &[(String, String)]) -> Result<Vec<LineItem>, InvoiceError> {
    let mut rows: BTreeMap<usize, PartialItem> = BTreeMap::new();
    for (key, value) in pairs {
        let Some(rest) = key.strip_prefix("items[") else {
            continue;
        };
        let Some((index, field)) = rest.split_once("][") else {
            continue;
        };
        let Ok(index) = index.parse::<usize>() else {
            continue;
        };
        let row = rows.entry(index).or_default();
        match field.trim_end_matches(']') {
            "description" => row.description = value.trim().to_string(),
            "quantity" => row.quantity = value.trim().to_string(),
            "unit_price" => row.unit_price = value.trim().to_string(),
            _ => {}
        }
    }

    let mut items = Vec::new();
    for row in rows.into_values() {
        if row.description.is_empty() && row.quantity.is_empty() && row.unit_price.is_empty() {
            continue;
        }
        let line = items.len() + 1;
        if row.description.is_empty() {
            return Err(InvoiceError::MissingDescription(line));
        }
        let quantity = if row.quantity.is_empty() {
            100
        } else {
            parse_amount(&row.quantity)?
        };
        if quantity <= 0 {
            return Err(InvoiceError::InvalidQuantity(line));
        }
        let unit_price = if row.unit_price.is_empty() {
            0
        } else {
            parse_amount(&row.unit_price)?
        };
        items.push(LineItem {
            description: row.description,
            quantity,
            unit_price,
        });
    }

    if items.is_empty() {
        return Err(InvoiceError::NoLineItems);
    }
    Ok(items)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_key")]
    pub key: String,
    pub number: String,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub tax_rate_bp: i64,
    #[serde(default)]
    pub totals: Totals,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub paid_at: Option<String>,
}

pub fn default_currency() -> String {
    "EUR".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn amounts_parse_to_hundredths() {
        assert_eq!(parse_amount("12").unwrap(), 1200);
        assert_eq!(parse_amount("12.5").unwrap(), 1250);
        assert_eq!(parse_amount("0,99").unwrap(), 99);
        assert_eq!(parse_amount(".5").unwrap(), 50);
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("-3").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn totals_round_half_up() {
        let items = vec![
            LineItem {
                description: "Consulting".into(),
                quantity: 150, // 1.5 hours
                unit_price: 3333,
            },
            LineItem {
                description: "Licence".into(),
                quantity: 100,
                unit_price: 10_000,
            },
        ];
        // 1.5 * 33.33 = 49.995 -> 50.00
        assert_eq!(items[0].total(), Some(5000));
        let totals = compute_totals(&items, 550).unwrap();
        assert_eq!(totals.subtotal, 15_000);
        assert_eq!(totals.tax, 825);
        assert_eq!(totals.total, 15_825);
    }

    #[test]
    fn status_transitions() {
        assert_eq!(InvoiceStatus::Draft.apply(InvoiceAction::Send), Ok(InvoiceStatus::Sent));
        assert_eq!(InvoiceStatus::Sent.apply(InvoiceAction::Pay), Ok(InvoiceStatus::Paid));
        assert_eq!(InvoiceStatus::Sent.apply(InvoiceAction::Void), Ok(InvoiceStatus::Void));
        assert!(InvoiceStatus::Draft.apply(InvoiceAction::Pay).is_err());
        assert!(InvoiceStatus::Paid.apply(InvoiceAction::Void).is_err());
        assert_eq!(InvoiceStatus::Sent.ensure_editable(), Err(InvoiceError::NotDraft));
        assert!(InvoiceStatus::Draft.ensure_editable().is_ok());
    }

    #[test]
    fn line_items_from_form_pairs() {
        let form = pairs(&[
            ("customer_name", "ACME"),
            ("items[1][description]", "Support"),
            ("items[1][quantity]", "2"),
            ("items[1][unit_price]", "50"),
            ("items[0][description]", "Setup"),
            ("items[0][unit_price]", "100.00"),
            ("items[2][description]", ""),
            ("items[2][quantity]", ""),
        ]);
        let items = parse_line_items(&form).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Setup");
        assert_eq!(items[0].quantity, 100);
        assert_eq!(items[1].total(), Some(10_000));
    }

    #[test]
    fn line_items_require_description() {
        let form = pairs(&[("items[0][quantity]", "1")]);
        assert_eq!(
            parse_line_items(&form),
            Err(InvoiceError::MissingDescription(1))
        );
        assert_eq!(parse_line_items(&[]), Err(InvoiceError::NoLineItems));
    }

    #[test]
    fn oversized_lines_are_rejected_not_wrapped() {
        let form = pairs(&[
            ("items[0][description]", "Bulk"),
            ("items[0][quantity]", "1000000000"),
            ("items[0][unit_price]", "10000000"),
        ]);
        let items = parse_line_items(&form).unwrap();
        assert_eq!(items[0].total(), None);
        assert_eq!(compute_totals(&items, 2000), Err(InvoiceError::LineTooLarge(1)));

        let item = LineItem {
            description: "Big".into(),
            quantity: 100,
            unit_price: i64::MAX / 200,
        };
        let items = vec![item; 201];
        assert!(compute_totals(&items[..200], 0).is_ok());
        assert_eq!(compute_totals(&items, 0), Err(InvoiceError::LineTooLarge(201)));

        let items = vec![LineItem {
            description: "Almost".into(),
            quantity: 100,
            unit_price: i64::MAX / 1000,
        }];
        assert_eq!(compute_totals(&items, 10_000), Err(InvoiceError::TotalTooLarge));
    }

    #[test]
    fn formatting() {
        assert_eq!(format_money(123_456, "EUR"), "1234.56 EUR");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(-250), "-2.50");
        assert_eq!(format_rate(2000), "20%");
        assert_eq!(format_rate(550), "5.5%");
        assert_eq!(format_rate(1225), "12.25%");
        assert_eq!(invoice_number(2026, 7), "INV-2026-0007");
    }

    #[test]
    fn sequence_continues_after_the_highest_number() {
        assert_eq!(next_sequence::<&str>(2026, &[]), 1);
        assert_eq!(next_sequence(2026, &["INV-2026-0002"]), 3);
        assert_eq!(
            next_sequence(2026, &["INV-2026-0009", "INV-2026-10000", "INV-2025-20000", "draft"]),
            10_001
        );
    }

    #[test]
    fn tax_rate_bounds() {
        assert_eq!(parse_tax_rate("").unwrap(), 0);
        assert_eq!(parse_tax_rate("20").unwrap(), 2000);
        assert!(parse_tax_rate("150").is_err());
    }
}
