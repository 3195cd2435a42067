use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use nominalroll_core::{DomainError, DomainResult, Entity, FormationId, OfficeId, StaffId};

use crate::dates;
use crate::field::{FieldValue, StaffDelta, StaffField};
use crate::movement::Location;
use crate::origin::resolve_origin;
use crate::rank::Rank;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl core::str::FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Ok(Gender::Male),
            "f" | "female" => Ok(Gender::Female),
            _ => Err(DomainError::validation(format!("unknown gender '{s}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for Gender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Employment status. Anything other than `Active` means the staff member has
/// exited and can no longer be moved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffStatus {
    Active,
    Retired,
    Deceased,
    Resigned,
    Dismissed,
    PostedOut,
}

impl StaffStatus {
    pub const ALL: [StaffStatus; 6] = [
        StaffStatus::Active,
        StaffStatus::Retired,
        StaffStatus::Deceased,
        StaffStatus::Resigned,
        StaffStatus::Dismissed,
        StaffStatus::PostedOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffStatus::Active => "active",
            StaffStatus::Retired => "retired",
            StaffStatus::Deceased => "deceased",
            StaffStatus::Resigned => "resigned",
            StaffStatus::Dismissed => "dismissed",
            StaffStatus::PostedOut => "posted_out",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StaffStatus::Active => "Active",
            StaffStatus::Retired => "Retired",
            StaffStatus::Deceased => "Deceased",
            StaffStatus::Resigned => "Resigned",
            StaffStatus::Dismissed => "Dismissed",
            StaffStatus::PostedOut => "Posted Out",
        }
    }

    pub fn is_exited(&self) -> bool {
        *self != StaffStatus::Active
    }
}

impl core::str::FromStr for StaffStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        StaffStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown staff status '{s}'")))
    }
}

impl<'de> Deserialize<'de> for StaffStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// A staff record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub nis_no: String,
    pub surname: String,
    pub other_names: String,
    pub rank: Rank,
    pub gender: Option<Gender>,
    pub dob: Option<NaiveDate>,
    pub dofa: Option<NaiveDate>,
    pub dopa: Option<NaiveDate>,
    pub dopp: Option<NaiveDate>,
    pub exit_date: Option<NaiveDate>,
    pub state_of_origin: Option<String>,
    pub lga: Option<String>,
    pub home_town: Option<String>,
    pub qualification: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub next_of_kin: Option<String>,
    pub nok_phone: Option<String>,
    pub remark: Option<String>,
    pub formation_id: FormationId,
    pub office_id: Option<OfficeId>,
    pub status: StaffStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a staff record.
///
/// Dates accept any of the layouts in [`dates::ACCEPTED_DATE_FORMATS`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub nis_no: String,
    pub surname: String,
    pub other_names: String,
    pub rank: Rank,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default, with = "dates::flexible_opt")]
    pub dob: Option<NaiveDate>,
    #[serde(default, with = "dates::flexible_opt")]
    pub dofa: Option<NaiveDate>,
    #[serde(default, with = "dates::flexible_opt")]
    pub dopa: Option<NaiveDate>,
    #[serde(default, with = "dates::flexible_opt")]
    pub dopp: Option<NaiveDate>,
    #[serde(default, with = "dates::flexible_opt")]
    pub exit_date: Option<NaiveDate>,
    #[serde(default)]
    pub state_of_origin: Option<String>,
    #[serde(default)]
    pub lga: Option<String>,
    #[serde(default)]
    pub home_town: Option<String>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub next_of_kin: Option<String>,
    #[serde(default)]
    pub nok_phone: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    pub formation_id: FormationId,
    #[serde(default)]
    pub office_id: Option<OfficeId>,
    #[serde(default)]
    pub status: Option<StaffStatus>,
}

fn required_text(field: StaffField, raw: &str) -> DomainResult<String> {
    field
        .parse_value(&serde_json::Value::String(raw.to_string()))?
        .into_text()
        .ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

fn optional_text(field: StaffField, raw: Option<String>) -> DomainResult<Option<String>> {
    match raw {
        None => Ok(None),
        Some(s) => Ok(field
            .parse_value(&serde_json::Value::String(s))?
            .into_text()),
    }
}

impl Staff {
    /// Validate and normalize a new record. Version starts at 1.
    pub fn create(id: StaffId, input: NewStaff, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut staff = Self {
            id,
            nis_no: required_text(StaffField::NisNo, &input.nis_no)?,
            surname: required_text(StaffField::Surname, &input.surname)?,
            other_names: required_text(StaffField::OtherNames, &input.other_names)?,
            rank: input.rank,
            gender: input.gender,
            dob: input.dob,
            dofa: input.dofa,
            dopa: input.dopa,
            dopp: input.dopp,
            exit_date: input.exit_date,
            state_of_origin: optional_text(StaffField::StateOfOrigin, input.state_of_origin)?,
            lga: optional_text(StaffField::Lga, input.lga)?,
            home_town: optional_text(StaffField::HomeTown, input.home_town)?,
            qualification: optional_text(StaffField::Qualification, input.qualification)?,
            phone: optional_text(StaffField::Phone, input.phone)?,
            email: optional_text(StaffField::Email, input.email)?,
            next_of_kin: optional_text(StaffField::NextOfKin, input.next_of_kin)?,
            nok_phone: optional_text(StaffField::NokPhone, input.nok_phone)?,
            remark: optional_text(StaffField::Remark, input.remark)?,
            formation_id: input.formation_id,
            office_id: input.office_id,
            status: input.status.unwrap_or(StaffStatus::Active),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        staff.canonical_origin()?;
        Ok(staff)
    }

    /// Replace state of origin and LGA with their reference spellings.
    fn canonical_origin(&mut self) -> DomainResult<()> {
        let (state, lga) = resolve_origin(self.state_of_origin.as_deref(), self.lga.as_deref())?;
        self.state_of_origin = state;
        self.lga = lga;
        Ok(())
    }

    pub fn location(&self) -> Location {
        Location::new(self.formation_id, self.office_id)
    }

    pub fn is_exited(&self) -> bool {
        self.status.is_exited()
    }

    /// "SURNAME Other Names", as used in notifications.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.surname.to_uppercase(), self.other_names)
    }

    /// Current value of a field.
    pub fn get(&self, field: StaffField) -> FieldValue {
        match field {
            StaffField::NisNo => FieldValue::Text(self.nis_no.clone()),
            StaffField::Surname => FieldValue::Text(self.surname.clone()),
            StaffField::OtherNames => FieldValue::Text(self.other_names.clone()),
            StaffField::Rank => FieldValue::Rank(self.rank),
            StaffField::Gender => self.gender.map(FieldValue::Gender).unwrap_or(FieldValue::Empty),
            StaffField::Dob => self.dob.into(),
            StaffField::Dofa => self.dofa.into(),
            StaffField::Dopa => self.dopa.into(),
            StaffField::Dopp => self.dopp.into(),
            StaffField::ExitDate => self.exit_date.into(),
            StaffField::StateOfOrigin => self.state_of_origin.clone().into(),
            StaffField::Lga => self.lga.clone().into(),
            StaffField::HomeTown => self.home_town.clone().into(),
            StaffField::Qualification => self.qualification.clone().into(),
            StaffField::Phone => self.phone.clone().into(),
            StaffField::Email => self.email.clone().into(),
            StaffField::NextOfKin => self.next_of_kin.clone().into(),
            StaffField::NokPhone => self.nok_phone.clone().into(),
            StaffField::Remark => self.remark.clone().into(),
            StaffField::Status => FieldValue::Status(self.status),
        }
    }

    fn set(&mut self, field: StaffField, value: FieldValue) -> DomainResult<()> {
        field.check(&value)?;
        match (field, value) {
            (StaffField::Rank, FieldValue::Rank(r)) => self.rank = r,
            (StaffField::Status, FieldValue::Status(s)) => self.status = s,
            (StaffField::Gender, FieldValue::Gender(g)) => self.gender = Some(g),
            (StaffField::Gender, FieldValue::Empty) => self.gender = None,
            (StaffField::NisNo, v) => self.nis_no = v.into_text().unwrap_or_default(),
            (StaffField::Surname, v) => self.surname = v.into_text().unwrap_or_default(),
            (StaffField::OtherNames, v) => self.other_names = v.into_text().unwrap_or_default(),
            (StaffField::Dob, v) => self.dob = v.into_date(),
            (StaffField::Dofa, v) => self.dofa = v.into_date(),
            (StaffField::Dopa, v) => self.dopa = v.into_date(),
            (StaffField::Dopp, v) => self.dopp = v.into_date(),
            (StaffField::ExitDate, v) => self.exit_date = v.into_date(),
            (StaffField::StateOfOrigin, v) => self.state_of_origin = v.into_text(),
            (StaffField::Lga, v) => self.lga = v.into_text(),
            (StaffField::HomeTown, v) => self.home_town = v.into_text(),
            (StaffField::Qualification, v) => self.qualification = v.into_text(),
            (StaffField::Phone, v) => self.phone = v.into_text(),
            (StaffField::Email, v) => self.email = v.into_text(),
            (StaffField::NextOfKin, v) => self.next_of_kin = v.into_text(),
            (StaffField::NokPhone, v) => self.nok_phone = v.into_text(),
            (StaffField::Remark, v) => self.remark = v.into_text(),
            (field, v) => {
                return Err(DomainError::invariant(format!(
                    "cannot assign {v:?} to {field}"
                )));
            }
        }
        Ok(())
    }

    /// Patch the record with `delta`. Fields outside the delta are untouched.
    ///
    /// All-or-nothing: on error the record is left unchanged.
    pub fn apply_delta(&mut self, delta: &StaffDelta, now: DateTime<Utc>) -> DomainResult<()> {
        let mut next = self.clone();
        for (field, value) in delta.iter() {
            next.set(field, value.clone())?;
        }
        if delta.fields().any(|f| matches!(f, StaffField::StateOfOrigin | StaffField::Lga)) {
            next.canonical_origin()?;
        }
        next.version = self.version + 1;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// `{field: {"from": old, "to": new}}` for every field the delta touches.
    pub fn diff(&self, delta: &StaffDelta) -> serde_json::Value {
        serde_json::Value::Object(
            delta
                .iter()
                .map(|(field, value)| {
                    (
                        field.key().to_string(),
                        serde_json::json!({ "from": self.get(field).to_json(), "to": value.to_json() }),
                    )
                })
                .collect(),
        )
    }

    pub fn relocate(&mut self, to: Location, now: DateTime<Utc>) {
        self.formation_id = to.formation_id;
        self.office_id = to.office_id;
        self.version += 1;
        self.updated_at = now;
    }

    /// Active, not exempt, and exit date on or before `on`.
    pub fn is_due_for_retirement(&self, on: NaiveDate) -> bool {
        self.status == StaffStatus::Active
            && !self.rank.is_retirement_exempt()
            && self.exit_date.is_some_and(|d| d <= on)
    }

    pub fn retire(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != StaffStatus::Active {
            return Err(DomainError::conflict(format!(
                "staff {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = StaffStatus::Retired;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Staff {
    type Id = StaffId;

    fn id(&self) -> &StaffId {
        &self.id
    }

    fn kind() -> &'static str {
        "staff"
    }
}

/// Fields hidden from roles without restricted read access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestrictedFields {
    pub nis_no: String,
    pub rank: Rank,
    pub dob: Option<NaiveDate>,
    pub dopa: Option<NaiveDate>,
    pub dopp: Option<NaiveDate>,
    pub exit_date: Option<NaiveDate>,
    pub status: StaffStatus,
}

/// Caller-facing projection of a staff record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffView {
    pub id: StaffId,
    pub surname: String,
    pub other_names: String,
    pub gender: Option<Gender>,
    pub dofa: Option<NaiveDate>,
    pub state_of_origin: Option<String>,
    pub lga: Option<String>,
    pub home_town: Option<String>,
    pub qualification: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub next_of_kin: Option<String>,
    pub nok_phone: Option<String>,
    pub remark: Option<String>,
    pub formation_id: FormationId,
    pub office_id: Option<OfficeId>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub restricted: Option<RestrictedFields>,
}

impl StaffView {
    pub fn new(staff: &Staff, read_restricted: bool) -> Self {
        let restricted = read_restricted.then(|| RestrictedFields {
            nis_no: staff.nis_no.clone(),
            rank: staff.rank,
            dob: staff.dob,
            dopa: staff.dopa,
            dopp: staff.dopp,
            exit_date: staff.exit_date,
            status: staff.status,
        });
        Self {
            id: staff.id,
            surname: staff.surname.clone(),
            other_names: staff.other_names.clone(),
            gender: staff.gender,
            dofa: staff.dofa,
            state_of_origin: staff.state_of_origin.clone(),
            lga: staff.lga.clone(),
            home_town: staff.home_town.clone(),
            qualification: staff.qualification.clone(),
            phone: staff.phone.clone(),
            email: staff.email.clone(),
            next_of_kin: staff.next_of_kin.clone(),
            nok_phone: staff.nok_phone.clone(),
            remark: staff.remark.clone(),
            formation_id: staff.formation_id,
            office_id: staff.office_id,
            version: staff.version,
            created_at: staff.created_at,
            updated_at: staff.updated_at,
            restricted,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    pub(crate) fn sample_staff() -> Staff {
        let input: NewStaff = serde_json::from_value(json!({
            "nis_no": " nis/1001 ",
            "surname": "Okafor",
            "other_names": "Chidi Emeka",
            "rank": "DSI",
            "gender": "M",
            "dob": "12/04/1975",
            "dofa": "1999-06-01",
            "exit_date": "2035-04-12",
            "phone": "08030000000",
            "state_of_origin": "anambra",
            "lga": "nnewi north",
            "remark": "   ",
            "formation_id": FormationId::new(),
        }))
        .unwrap();
        Staff::create(StaffId::new(), input, Utc::now()).unwrap()
    }

    #[test]
    fn create_normalizes_input() {
        let s = sample_staff();
        assert_eq!(s.nis_no, "NIS/1001");
        assert_eq!(s.rank, Rank::DeputySuperintendent);
        assert_eq!(s.gender, Some(Gender::Male));
        assert_eq!(s.dob, NaiveDate::from_ymd_opt(1975, 4, 12));
        assert_eq!(s.remark, None);
        assert_eq!(s.status, StaffStatus::Active);
        assert_eq!(s.version, 1);
        assert_eq!(s.state_of_origin.as_deref(), Some("Anambra"));
        assert_eq!(s.lga.as_deref(), Some("Nnewi North"));
    }

    #[test]
    fn origin_must_match_the_reference_table() {
        let input: NewStaff = serde_json::from_value(json!({
            "nis_no": "N9", "surname": "Eze", "other_names": "Ada", "rank": "SI",
            "state_of_origin": "Anambra", "lga": "Ikeja",
            "formation_id": FormationId::new(),
        }))
        .unwrap();
        assert!(matches!(
            Staff::create(StaffId::new(), input, Utc::now()),
            Err(DomainError::Validation(_))
        ));

        // Moving to another state must bring a matching LGA along.
        let mut s = sample_staff();
        let state_only: StaffDelta = serde_json::from_value(json!({"state_of_origin": "Lagos"})).unwrap();
        assert!(s.apply_delta(&state_only, Utc::now()).is_err());
        assert_eq!(s.version, 1);

        let both: StaffDelta =
            serde_json::from_value(json!({"state_of_origin": "lagos", "lga": "surulere"})).unwrap();
        s.apply_delta(&both, Utc::now()).unwrap();
        assert_eq!((s.state_of_origin.as_deref(), s.lga.as_deref()), (Some("Lagos"), Some("Surulere")));

        // Unrelated edits leave legacy free text alone.
        s.lga = Some("Old Town".into());
        let phone: StaffDelta = serde_json::from_value(json!({"phone": "0809"})).unwrap();
        s.apply_delta(&phone, Utc::now()).unwrap();
        assert_eq!(s.lga.as_deref(), Some("Old Town"));
    }

    #[test]
    fn create_rejects_blank_required_fields() {
        let input: NewStaff = serde_json::from_value(json!({
            "nis_no": "N1", "surname": "  ", "other_names": "A", "rank": "SI",
            "formation_id": FormationId::new(),
        }))
        .unwrap();
        assert!(matches!(
            Staff::create(StaffId::new(), input, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn apply_delta_bumps_version_and_diff_reports_old_values() {
        let mut s = sample_staff();
        let delta: StaffDelta =
            serde_json::from_value(json!({"rank": "SI", "phone": null})).unwrap();
        let diff = s.diff(&delta);
        assert_eq!(diff["rank"]["from"], "DSI");
        assert_eq!(diff["rank"]["to"], "SI");
        assert_eq!(diff["phone"]["to"], serde_json::Value::Null);

        s.apply_delta(&delta, Utc::now()).unwrap();
        assert_eq!(s.rank, Rank::Superintendent);
        assert_eq!(s.phone, None);
        assert_eq!(s.version, 2);
    }

    #[test]
    fn view_redacts_restricted_fields() {
        let s = sample_staff();
        let open = serde_json::to_value(StaffView::new(&s, true)).unwrap();
        assert_eq!(open["rank"], "DSI");
        assert_eq!(open["nis_no"], "NIS/1001");

        let redacted = serde_json::to_value(StaffView::new(&s, false)).unwrap();
        for key in ["rank", "nis_no", "dob", "dopa", "dopp", "exit_date", "status"] {
            assert!(redacted.get(key).is_none(), "{key} leaked");
        }
        assert_eq!(redacted["surname"], "Okafor");
    }

    #[test]
    fn retirement_due_dates() {
        let mut s = sample_staff();
        let exit = s.exit_date.unwrap();
        assert!(!s.is_due_for_retirement(exit.pred_opt().unwrap()));
        assert!(s.is_due_for_retirement(exit));

        s.rank = Rank::ComptrollerGeneral;
        assert!(!s.is_due_for_retirement(exit));

        s.rank = Rank::Superintendent;
        s.retire(Utc::now()).unwrap();
        assert!(s.is_exited());
        assert!(matches!(s.retire(Utc::now()), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn status_parses_loosely() {
        assert_eq!("Posted Out".parse::<StaffStatus>().unwrap(), StaffStatus::PostedOut);
        assert_eq!("posted-out".parse::<StaffStatus>().unwrap(), StaffStatus::PostedOut);
        assert!("missing".parse::<StaffStatus>().is_err());
    }

    fn arb_delta() -> impl Strategy<Value = StaffDelta> {
        let phone = proptest::option::of("[0-9]{11}");
        let remark = proptest::option::of("[a-z]{1,12}");
        let rank = proptest::option::of(0usize..18);
        let dopa = proptest::option::of((2000i32..2030, 1u32..13, 1u32..29));
        (phone, remark, rank, dopa).prop_map(|(phone, remark, rank, dopa)| {
            let mut delta = StaffDelta::new();
            if let Some(p) = phone {
                delta.set(StaffField::Phone, FieldValue::Text(p)).unwrap();
            }
            if let Some(r) = remark {
                delta.set(StaffField::Remark, FieldValue::Text(r)).unwrap();
            }
            if let Some(i) = rank {
                delta.set(StaffField::Rank, FieldValue::Rank(Rank::ALL[i])).unwrap();
            }
            if let Some((y, m, d)) = dopa {
                let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
                delta.set(StaffField::Dopa, FieldValue::Date(date)).unwrap();
            }
            delta
        })
    }

    proptest! {
        #[test]
        fn applied_delta_patches_only_its_fields(delta in arb_delta()) {
            let before = sample_staff();
            let mut after = before.clone();
            after.apply_delta(&delta, Utc::now()).unwrap();

            for field in StaffField::ALL {
                match delta.get(field) {
                    Some(v) => prop_assert_eq!(&after.get(field), v),
                    None => prop_assert_eq!(after.get(field), before.get(field)),
                }
            }
            prop_assert_eq!(after.location(), before.location());
            prop_assert_eq!(after.version, before.version + 1);
        }
    }
}
