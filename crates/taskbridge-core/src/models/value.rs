//! Typed field values shared by local tasks and remote pages

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a mapped field, used for type-aware comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Select,
    Checkbox,
}

/// A property value as read from either store
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Select(String),
    Checkbox(bool),
}

impl FieldValue {
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Convert this value into the canonical representation for `kind`.
    ///
    /// Returns `None` when the value cannot represent that kind (for example
    /// non-numeric text for a number field).
    pub fn coerce(&self, kind: FieldKind) -> Option<Self> {
        match kind {
            FieldKind::Text => Some(self.coerce_text()),
            FieldKind::Number => self.coerce_number(),
            FieldKind::Date => self.coerce_date(),
            FieldKind::Select => self.coerce_select(),
            FieldKind::Checkbox => self.coerce_checkbox(),
        }
    }

    /// Compare two values as `kind`, so equivalent representations
    /// (`"3"` and `3.0`, a date and its RFC 3339 timestamp) are equal.
    pub fn equivalent(&self, other: &Self, kind: FieldKind) -> bool {
        match (self.coerce(kind), other.coerce(kind)) {
            (Some(left), Some(right)) => canonical_eq(&left, &right),
            _ => self == other,
        }
    }

    fn coerce_text(&self) -> Self {
        let text = match self {
            Self::Empty => return Self::Empty,
            Self::Text(value) | Self::Select(value) => value.clone(),
            Self::Number(value) => value.to_string(),
            Self::Date(value) => value.to_string(),
            Self::Checkbox(value) => value.to_string(),
        };
        if text.is_empty() {
            Self::Empty
        } else {
            Self::Text(text)
        }
    }

    fn coerce_number(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Number(value) => Some(Self::Number(*value)),
            Self::Text(value) | Self::Select(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Some(Self::Empty);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|number| number.is_finite())
                    .map(Self::Number)
            }
            Self::Date(_) | Self::Checkbox(_) => None,
        }
    }

    fn coerce_date(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Date(value) => Some(Self::Date(*value)),
            Self::Text(value) | Self::Select(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Some(Self::Empty);
                }
                parse_date(trimmed).map(Self::Date)
            }
            Self::Number(_) | Self::Checkbox(_) => None,
        }
    }

    fn coerce_select(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Text(value) | Self::Select(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Some(Self::Empty)
                } else {
                    Some(Self::Select(trimmed.to_string()))
                }
            }
            Self::Number(value) => Some(Self::Select(value.to_string())),
            Self::Date(_) | Self::Checkbox(_) => None,
        }
    }

    fn coerce_checkbox(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Checkbox(false)),
            Self::Checkbox(value) => Some(Self::Checkbox(*value)),
            Self::Text(value) | Self::Select(value) => {
                match value.trim().to_ascii_lowercase().as_str() {
                    "" | "false" | "no" | "0" | "off" => Some(Self::Checkbox(false)),
                    "true" | "yes" | "1" | "on" => Some(Self::Checkbox(true)),
                    _ => None,
                }
            }
            Self::Number(_) | Self::Date(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("(empty)"),
            Self::Text(value) | Self::Select(value) => write!(f, "{value:?}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Date(value) => write!(f, "{value}"),
            Self::Checkbox(value) => write!(f, "{value}"),
        }
    }
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp into a calendar date.
///
/// Timestamps keep the date as written in their own offset.
pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|date_time| date_time.date_naive())
        })
}

fn canonical_eq(left: &FieldValue, right: &FieldValue) -> bool {
    match (left, right) {
        (FieldValue::Number(a), FieldValue::Number(b)) => {
            let scale = a.abs().max(b.abs()).max(1.0);
            (a - b).abs() <= f64::EPSILON * scale
        }
        (FieldValue::Select(a), FieldValue::Select(b)) => a.to_lowercase() == b.to_lowercase(),
        _ => left == right,
    }
}
