//! Staff movements between offices and formations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nominalroll_auth::Role;
use nominalroll_core::{Entity, FormationId, MovementId, OfficeId, StaffId, UserId};

/// Where a staff member sits in the hierarchy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub formation_id: FormationId,
    pub office_id: Option<OfficeId>,
}

impl Location {
    pub fn new(formation_id: FormationId, office_id: Option<OfficeId>) -> Self {
        Self {
            formation_id,
            office_id,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Office changes, formation unchanged.
    InternalMovement,
    /// Formation changes.
    FormationPosting,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::InternalMovement => "internal_movement",
            MovementKind::FormationPosting => "formation_posting",
        }
    }
}

impl core::str::FromStr for MovementKind {
    type Err = nominalroll_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal_movement" | "internal" => Ok(MovementKind::InternalMovement),
            "formation_posting" | "posting" => Ok(MovementKind::FormationPosting),
            _ => Err(nominalroll_core::DomainError::validation(format!(
                "unknown movement kind '{s}'"
            ))),
        }
    }
}

/// Classify a move. `None` means the target is the current location (no-op).
pub fn classify_move(from: Location, to: Location) -> Option<MovementKind> {
    if from == to {
        None
    } else if from.formation_id != to.formation_id {
        Some(MovementKind::FormationPosting)
    } else {
        Some(MovementKind::InternalMovement)
    }
}

/// Append-only movement history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub staff_id: StaffId,
    pub kind: MovementKind,
    pub from: Location,
    pub to: Location,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: UserId,
    pub actor_role: Role,
}

impl Entity for MovementRecord {
    type Id = MovementId;

    fn id(&self) -> &MovementId {
        &self.id
    }

    fn kind() -> &'static str {
        "movement"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let f1 = FormationId::new();
        let f2 = FormationId::new();
        let o1 = OfficeId::new();
        let o2 = OfficeId::new();

        let here = Location::new(f1, Some(o1));
        assert_eq!(classify_move(here, here), None);
        assert_eq!(
            classify_move(here, Location::new(f1, Some(o2))),
            Some(MovementKind::InternalMovement)
        );
        assert_eq!(
            classify_move(here, Location::new(f1, None)),
            Some(MovementKind::InternalMovement)
        );
        assert_eq!(
            classify_move(here, Location::new(f2, None)),
            Some(MovementKind::FormationPosting)
        );
    }

    #[test]
    fn kind_parses_short_forms() {
        assert_eq!("posting".parse::<MovementKind>().unwrap(), MovementKind::FormationPosting);
        assert_eq!(
            "internal_movement".parse::<MovementKind>().unwrap(),
            MovementKind::InternalMovement
        );
        assert!("sideways".parse::<MovementKind>().is_err());
    }
}
