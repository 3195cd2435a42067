use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};

use nominalroll_auth::{Principal, Role};
use nominalroll_core::{DomainError, DomainResult, ExpectedVersion, FormationId, OfficeId, StaffId};
use nominalroll_personnel::{
    DateRange, Gender, MovementKind, Rank, Staff, StaffDelta, StaffFilter, StaffStatus, StaffView, parse_date,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitEditRequest {
    pub staff_id: StaffId,
    pub changes: StaffDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetirementRequest {
    /// Cut-off day in any accepted date format; defaults to today.
    #[serde(default)]
    pub on: Option<String>,
}

/// `PATCH /staff/:id` body: a flat field map plus an optional
/// `expected_version` for optimistic concurrency.
pub fn staff_patch(mut body: Map<String, Value>) -> DomainResult<(StaffDelta, ExpectedVersion)> {
    let expected = match body.remove("expected_version") {
        None | Some(Value::Null) => ExpectedVersion::Any,
        Some(Value::Number(n)) => n
            .as_u64()
            .map(ExpectedVersion::Exact)
            .ok_or_else(|| DomainError::validation("expected_version must be a non-negative integer"))?,
        Some(_) => return Err(DomainError::validation("expected_version must be a non-negative integer")),
    };
    Ok((StaffDelta::from_json_map(&body)?, expected))
}

// -------------------------
// Query parameters
// -------------------------

/// Staff listing/export filter as sent on the query string. Dates accept
/// every format the directory accepts; `rank` is comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct StaffListParams {
    pub search: Option<String>,
    pub rank: Option<String>,
    pub formation_id: Option<FormationId>,
    pub office_id: Option<OfficeId>,
    pub status: Option<String>,
    pub gender: Option<String>,
    pub dob_from: Option<String>,
    pub dob_to: Option<String>,
    pub dopa_from: Option<String>,
    pub dopa_to: Option<String>,
    pub exit_from: Option<String>,
    pub exit_to: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn opt_date(raw: &Option<String>) -> DomainResult<Option<NaiveDate>> {
    match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date(s).map(Some),
        None => Ok(None),
    }
}

fn range(from: &Option<String>, to: &Option<String>) -> DomainResult<DateRange> {
    Ok(DateRange {
        from: opt_date(from)?,
        to: opt_date(to)?,
    })
}

fn non_blank(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl StaffListParams {
    pub fn into_filter(self) -> DomainResult<StaffFilter> {
        let ranks = match non_blank(&self.rank) {
            Some(list) => list
                .split(',')
                .filter(|r| !r.trim().is_empty())
                .map(str::parse::<Rank>)
                .collect::<DomainResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(StaffFilter {
            search: non_blank(&self.search).map(str::to_string),
            ranks,
            formation_id: self.formation_id,
            office_id: self.office_id,
            staff_id: None,
            status: non_blank(&self.status).map(str::parse::<StaffStatus>).transpose()?,
            gender: non_blank(&self.gender).map(str::parse::<Gender>).transpose()?,
            dob: range(&self.dob_from, &self.dob_to)?,
            dopa: range(&self.dopa_from, &self.dopa_to)?,
            exit_date: range(&self.exit_from, &self.exit_to)?,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    /// Comma-separated column keys.
    pub columns: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementParams {
    pub kind: Option<String>,
}

impl MovementParams {
    pub fn kind(&self) -> DomainResult<Option<MovementKind>> {
        non_blank(&self.kind).map(str::parse::<MovementKind>).transpose()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OfficeParams {
    pub formation_id: Option<FormationId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserParams {
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread: bool,
}

// -------------------------
// Response mapping
// -------------------------

/// Staff record as the caller may see it (restricted fields only for roles
/// that can read them).
pub fn staff_to_json(principal: &Principal, staff: &Staff) -> Value {
    serde_json::to_value(StaffView::new(staff, principal.capabilities().read_restricted))
        .unwrap_or(Value::Null)
}

pub fn items<T: serde::Serialize>(items: &[T]) -> Value {
    serde_json::json!({ "items": items })
}
