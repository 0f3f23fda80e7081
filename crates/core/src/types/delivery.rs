//! Delivery date, time slot and contact phone captured before checkout.

use core::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A delivery window offered by the bakery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliverySlot {
    #[serde(rename = "11AM - 2PM")]
    Midday,
    #[serde(rename = "3PM - 5PM")]
    Afternoon,
    #[serde(rename = "6PM - 8PM")]
    Evening,
}

impl DeliverySlot {
    /// All slots, in display order.
    pub const ALL: [Self; 3] = [Self::Midday, Self::Afternoon, Self::Evening];

    /// The label shown to customers and sent to the backend.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Midday => "11AM - 2PM",
            Self::Afternoon => "3PM - 5PM",
            Self::Evening => "6PM - 8PM",
        }
    }

    /// Look a slot up by its label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL.into_iter().find(|slot| slot.label() == label)
    }
}

impl fmt::Display for DeliverySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single problem with the delivery form.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Please pick a delivery date")]
    MissingDate,
    #[error("Delivery date must look like YYYY-MM-DD")]
    InvalidDate,
    #[error("Please choose a delivery time")]
    InvalidSlot,
    #[error("Please enter a phone number")]
    MissingPhone,
}

impl DeliveryError {
    /// The form field this error belongs to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingDate | Self::InvalidDate => "deliveryDate",
            Self::InvalidSlot => "deliveryTime",
            Self::MissingPhone => "phone",
        }
    }
}

/// Validated delivery details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDetails {
    pub date: NaiveDate,
    pub slot: DeliverySlot,
    /// Digits only.
    pub phone: String,
}

impl DeliveryDetails {
    /// Validate raw form input.
    ///
    /// The phone number is reduced to its ASCII digits before the emptiness
    /// check, so `"+62 812-3456"` becomes `"628123456"`.
    ///
    /// # Errors
    ///
    /// Returns every problem found, one per field at most.
    pub fn parse(date: &str, time: &str, phone: &str) -> Result<Self, Vec<DeliveryError>> {
        let mut errors = Vec::new();

        let date = date.trim();
        let parsed_date = if date.is_empty() {
            errors.push(DeliveryError::MissingDate);
            None
        } else {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| errors.push(DeliveryError::InvalidDate))
                .ok()
        };

        let slot = DeliverySlot::from_label(time);
        if slot.is_none() {
            errors.push(DeliveryError::InvalidSlot);
        }

        let phone = digits_only(phone);
        if phone.is_empty() {
            errors.push(DeliveryError::MissingPhone);
        }

        match (parsed_date, slot) {
            (Some(date), Some(slot)) if errors.is_empty() => Ok(Self { date, slot, phone }),
            _ => Err(errors),
        }
    }

    /// The date in the `YYYY-MM-DD` form the backend expects.
    #[must_use]
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Strip everything except ASCII digits.
#[must_use]
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_details() {
        let details = DeliveryDetails::parse("2030-02-14", "3PM - 5PM", "+62 812-3456").unwrap();
        assert_eq!(details.slot, DeliverySlot::Afternoon);
        assert_eq!(details.phone, "628123456");
        assert_eq!(details.date_string(), "2030-02-14");
    }

    #[test]
    fn test_parse_collects_every_error() {
        let errors = DeliveryDetails::parse("", "midnight", "abc").unwrap_err();
        let fields: Vec<_> = errors.iter().map(DeliveryError::field).collect();
        assert_eq!(fields, vec!["deliveryDate", "deliveryTime", "phone"]);
    }

    #[test]
    fn test_parse_rejects_bad_date_format() {
        let errors = DeliveryDetails::parse("14/02/2030", "6PM - 8PM", "0812").unwrap_err();
        assert_eq!(errors, vec![DeliveryError::InvalidDate]);
    }

    #[test]
    fn test_slot_serde_uses_labels() {
        let json = serde_json::to_string(&DeliverySlot::Midday).unwrap();
        assert_eq!(json, "\"11AM - 2PM\"");
    }
}
