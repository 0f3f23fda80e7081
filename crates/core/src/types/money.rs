//! Monetary amounts and the storefront's price display convention.
//!
//! Prices are shown in thousands of rupiah with Indonesian digit grouping:
//! `150000` renders as `150` and `1250000` as `1.250`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount with its currency code.
///
/// The backend sends amounts either as JSON strings (`"150000.0"`) or numbers
/// (`150000`); both deserialize into a [`Decimal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Amount in whole rupiah.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    #[serde(default = "default_currency")]
    pub currency_code: String,
}

fn default_currency() -> String {
    "IDR".to_string()
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub fn new(amount: Decimal, currency_code: impl Into<String>) -> Self {
        Self {
            amount,
            currency_code: currency_code.into(),
        }
    }

    /// Multiply by a line quantity.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount * Decimal::from(quantity),
            currency_code: self.currency_code.clone(),
        }
    }

    /// Format in thousands, without the currency code.
    #[must_use]
    pub fn display(&self) -> String {
        format_thousands(self.amount)
    }

    /// Format in thousands, prefixed by the currency code (`IDR 150`).
    #[must_use]
    pub fn display_with_currency(&self) -> String {
        format!("{} {}", self.currency_code, self.display())
    }
}

/// Format a rupiah amount in thousands with `.` digit grouping.
///
/// Rounds half away from zero to a whole number of thousands.
#[must_use]
pub fn format_thousands(amount: Decimal) -> String {
    let thousands = (amount / Decimal::ONE_THOUSAND)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    let negative = thousands.is_sign_negative() && !thousands.is_zero();
    let digits = thousands.abs().trunc().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Format an optional amount, falling back to `-` when absent.
#[must_use]
pub fn format_optional(amount: Option<Decimal>) -> String {
    amount.map_or_else(|| "-".to_string(), format_thousands)
}
