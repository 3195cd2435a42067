//! Editable staff fields and typed field deltas.
//!
//! A [`StaffDelta`] is the unit of change for direct updates and pending edits.
//! On the wire it is a flat JSON object (`{"rank": "ASI 1", "phone": null}`);
//! in memory every value is already parsed and checked against its field.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use nominalroll_auth::FieldTier;
use nominalroll_core::{DomainError, DomainResult};

use crate::dates::parse_date;
use crate::rank::Rank;
use crate::staff::{Gender, StaffStatus};

/// A staff attribute that can be changed through the directory or a pending
/// edit. Location (formation/office) is deliberately absent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffField {
    NisNo,
    Surname,
    OtherNames,
    Rank,
    Gender,
    Dob,
    Dofa,
    Dopa,
    Dopp,
    ExitDate,
    StateOfOrigin,
    Lga,
    HomeTown,
    Qualification,
    Phone,
    Email,
    NextOfKin,
    NokPhone,
    Remark,
    Status,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ValueKind {
    Text,
    Date,
    Rank,
    Gender,
    Status,
}

impl StaffField {
    pub const ALL: [StaffField; 20] = [
        StaffField::NisNo,
        StaffField::Surname,
        StaffField::OtherNames,
        StaffField::Rank,
        StaffField::Gender,
        StaffField::Dob,
        StaffField::Dofa,
        StaffField::Dopa,
        StaffField::Dopp,
        StaffField::ExitDate,
        StaffField::StateOfOrigin,
        StaffField::Lga,
        StaffField::HomeTown,
        StaffField::Qualification,
        StaffField::Phone,
        StaffField::Email,
        StaffField::NextOfKin,
        StaffField::NokPhone,
        StaffField::Remark,
        StaffField::Status,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            StaffField::NisNo => "nis_no",
            StaffField::Surname => "surname",
            StaffField::OtherNames => "other_names",
            StaffField::Rank => "rank",
            StaffField::Gender => "gender",
            StaffField::Dob => "dob",
            StaffField::Dofa => "dofa",
            StaffField::Dopa => "dopa",
            StaffField::Dopp => "dopp",
            StaffField::ExitDate => "exit_date",
            StaffField::StateOfOrigin => "state_of_origin",
            StaffField::Lga => "lga",
            StaffField::HomeTown => "home_town",
            StaffField::Qualification => "qualification",
            StaffField::Phone => "phone",
            StaffField::Email => "email",
            StaffField::NextOfKin => "next_of_kin",
            StaffField::NokPhone => "nok_phone",
            StaffField::Remark => "remark",
            StaffField::Status => "status",
        }
    }

    /// Write-sensitivity tier of the field.
    pub fn tier(&self) -> FieldTier {
        match self {
            StaffField::Phone
            | StaffField::Email
            | StaffField::NextOfKin
            | StaffField::NokPhone
            | StaffField::HomeTown
            | StaffField::StateOfOrigin
            | StaffField::Lga => FieldTier::Personal,
            StaffField::Surname
            | StaffField::OtherNames
            | StaffField::Gender
            | StaffField::Qualification
            | StaffField::Remark
            | StaffField::Dofa => FieldTier::Administrative,
            StaffField::NisNo
            | StaffField::Rank
            | StaffField::Dob
            | StaffField::Dopa
            | StaffField::Dopp
            | StaffField::ExitDate
            | StaffField::Status => FieldTier::Restricted,
        }
    }

    /// Required fields can be replaced but never cleared.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            StaffField::NisNo
                | StaffField::Surname
                | StaffField::OtherNames
                | StaffField::Rank
                | StaffField::Status
        )
    }

    fn kind(&self) -> ValueKind {
        match self {
            StaffField::Rank => ValueKind::Rank,
            StaffField::Gender => ValueKind::Gender,
            StaffField::Status => ValueKind::Status,
            StaffField::Dob
            | StaffField::Dofa
            | StaffField::Dopa
            | StaffField::Dopp
            | StaffField::ExitDate => ValueKind::Date,
            _ => ValueKind::Text,
        }
    }

    /// Parse a raw JSON value for this field.
    ///
    /// `null` and blank strings clear optional fields.
    pub fn parse_value(&self, raw: &Value) -> DomainResult<FieldValue> {
        let text = match raw {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim()),
            other => {
                return Err(DomainError::validation(format!(
                    "{} must be a string, got {other}",
                    self.key()
                )));
            }
        };

        let value = match (text, self.kind()) {
            (None, _) => FieldValue::Empty,
            (Some(s), ValueKind::Text) => FieldValue::Text(normalize_text(*self, s)?),
            (Some(s), ValueKind::Date) => FieldValue::Date(parse_date(s)?),
            (Some(s), ValueKind::Rank) => FieldValue::Rank(s.parse()?),
            (Some(s), ValueKind::Gender) => FieldValue::Gender(s.parse()?),
            (Some(s), ValueKind::Status) => FieldValue::Status(s.parse()?),
        };
        self.check(&value)?;
        Ok(value)
    }

    /// Check that an already-typed value fits this field.
    pub fn check(&self, value: &FieldValue) -> DomainResult<()> {
        let fits = matches!(
            (self.kind(), value),
            (_, FieldValue::Empty)
                | (ValueKind::Text, FieldValue::Text(_))
                | (ValueKind::Date, FieldValue::Date(_))
                | (ValueKind::Rank, FieldValue::Rank(_))
                | (ValueKind::Gender, FieldValue::Gender(_))
                | (ValueKind::Status, FieldValue::Status(_))
        );
        if !fits {
            return Err(DomainError::validation(format!(
                "value {value:?} does not fit field '{}'",
                self.key()
            )));
        }
        if self.is_required() && *value == FieldValue::Empty {
            return Err(DomainError::validation(format!(
                "{} is required and cannot be cleared",
                self.key()
            )));
        }
        Ok(())
    }
}

fn normalize_text(field: StaffField, s: &str) -> DomainResult<String> {
    match field {
        StaffField::NisNo => Ok(s.to_ascii_uppercase()),
        StaffField::Email if !s.contains('@') => Err(DomainError::validation(format!(
            "email '{s}' is not a valid address"
        ))),
        _ => Ok(s.to_string()),
    }
}

impl core::fmt::Display for StaffField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.key())
    }
}

impl core::str::FromStr for StaffField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StaffField::ALL
            .into_iter()
            .find(|f| f.key() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown staff field '{s}'")))
    }
}

/// Parsed value of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Rank(Rank),
    Gender(Gender),
    Status(StaffStatus),
    /// Cleared optional field.
    Empty,
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Rank(r) => Value::String(r.code().to_string()),
            FieldValue::Gender(g) => Value::String(g.as_str().to_string()),
            FieldValue::Status(s) => Value::String(s.as_str().to_string()),
            FieldValue::Empty => Value::Null,
        }
    }

    pub(crate) fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn into_date(self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Empty)
    }
}

impl From<Option<NaiveDate>> for FieldValue {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(FieldValue::Date).unwrap_or(FieldValue::Empty)
    }
}

/// A non-conflicting set of field changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaffDelta {
    changes: BTreeMap<StaffField, FieldValue>,
}

impl StaffDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert with validation.
    pub fn with(mut self, field: StaffField, value: FieldValue) -> DomainResult<Self> {
        self.set(field, value)?;
        Ok(self)
    }

    pub fn set(&mut self, field: StaffField, value: FieldValue) -> DomainResult<()> {
        field.check(&value)?;
        self.changes.insert(field, value);
        Ok(())
    }

    /// Parse a JSON object of `field key → raw value`.
    pub fn from_json_map(map: &Map<String, Value>) -> DomainResult<Self> {
        let mut delta = Self::new();
        for (key, raw) in map {
            if key == "formation_id" || key == "office_id" {
                return Err(DomainError::validation(
                    "location changes go through the movement workflow",
                ));
            }
            let field: StaffField = key.parse()?;
            let value = field.parse_value(raw)?;
            delta.changes.insert(field, value);
        }
        Ok(delta)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.changes
                .iter()
                .map(|(f, v)| (f.key().to_string(), v.to_json()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, field: StaffField) -> Option<&FieldValue> {
        self.changes.get(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = StaffField> + '_ {
        self.changes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StaffField, &FieldValue)> + '_ {
        self.changes.iter().map(|(f, v)| (*f, v))
    }

    /// Highest tier touched by the delta.
    pub fn max_tier(&self) -> Option<FieldTier> {
        self.fields().map(|f| f.tier()).max()
    }

    /// Fields whose tier exceeds `write_tier`.
    pub fn fields_above(&self, write_tier: FieldTier) -> Vec<StaffField> {
        self.fields().filter(|f| f.tier() > write_tier).collect()
    }
}

impl Serialize for StaffDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.changes.len()))?;
        for (field, value) in &self.changes {
            map.serialize_entry(field.key(), &value.to_json())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StaffDelta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        StaffDelta::from_json_map(&map).map_err(serde::de::Error::custom)
    }
}
