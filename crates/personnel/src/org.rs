//! Formation/office hierarchy (two levels: formation → offices).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nominalroll_core::{DomainError, DomainResult, Entity, FormationId, OfficeId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationKind {
    Headquarters,
    Directorate,
    ZonalCommand,
    StateCommand,
    Other,
}

impl FormationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormationKind::Headquarters => "headquarters",
            FormationKind::Directorate => "directorate",
            FormationKind::ZonalCommand => "zonal_command",
            FormationKind::StateCommand => "state_command",
            FormationKind::Other => "other",
        }
    }
}

impl core::str::FromStr for FormationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "headquarters" => Ok(FormationKind::Headquarters),
            "directorate" => Ok(FormationKind::Directorate),
            "zonal_command" => Ok(FormationKind::ZonalCommand),
            "state_command" => Ok(FormationKind::StateCommand),
            "other" => Ok(FormationKind::Other),
            _ => Err(DomainError::validation(format!("unknown formation kind '{s}'"))),
        }
    }
}

/// Top-level organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formation {
    pub id: FormationId,
    pub name: String,
    /// Short code, stored uppercase (e.g. "LAG").
    pub code: String,
    pub kind: FormationKind,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormationPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub kind: Option<FormationKind>,
    pub description: Option<String>,
}

fn non_blank(what: &str, raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

impl Formation {
    pub fn new(
        id: FormationId,
        name: &str,
        code: &str,
        kind: FormationKind,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: non_blank("formation name", name)?,
            code: non_blank("formation code", code)?.to_ascii_uppercase(),
            kind,
            description: description.filter(|d| !d.trim().is_empty()),
            created_at: now,
        })
    }

    pub fn apply(&mut self, patch: FormationPatch) -> DomainResult<()> {
        if let Some(name) = patch.name {
            self.name = non_blank("formation name", &name)?;
        }
        if let Some(code) = patch.code {
            self.code = non_blank("formation code", &code)?.to_ascii_uppercase();
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(description) = patch.description {
            self.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        Ok(())
    }
}

impl Entity for Formation {
    type Id = FormationId;

    fn id(&self) -> &FormationId {
        &self.id
    }

    fn kind() -> &'static str {
        "formation"
    }
}

/// Sub-unit of a formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub formation_id: FormationId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Office {
    pub fn new(
        id: OfficeId,
        formation_id: FormationId,
        name: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            formation_id,
            name: non_blank("office name", name)?,
            created_at: now,
        })
    }

    pub fn rename(&mut self, name: &str) -> DomainResult<()> {
        self.name = non_blank("office name", name)?;
        Ok(())
    }

    /// Office names are unique per formation, compared case-insensitively.
    pub fn same_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other.trim())
    }
}

impl Entity for Office {
    type Id = OfficeId;

    fn id(&self) -> &OfficeId {
        &self.id
    }

    fn kind() -> &'static str {
        "office"
    }
}
