//! Calendar-date parsing and rendering.
//!
//! Service records arrive with dates in several hand-typed layouts; all of them
//! normalize to [`NaiveDate`].

use chrono::NaiveDate;

use nominalroll_core::{DomainError, DomainResult};

/// Accepted input layouts, tried in order.
pub const ACCEPTED_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

pub fn parse_date(raw: &str) -> DomainResult<NaiveDate> {
    let trimmed = raw.trim();
    ACCEPTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| {
            DomainError::validation(format!(
                "invalid date '{raw}' (expected YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY or YYYY/MM/DD)"
            ))
        })
}

/// `DD/MM/YYYY`, as printed on exported rolls.
pub fn format_dmy(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Serde adapter for `Option<NaiveDate>` fields that accept any of the
/// [`ACCEPTED_DATE_FORMATS`] on input and always emit ISO dates.
pub mod flexible_opt {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&d.format("%Y-%m-%d").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_date(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Serde adapter for required [`NaiveDate`] fields with flexible input.
pub mod flexible {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }
}
