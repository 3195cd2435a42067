use core::str::FromStr;

use serde::{Deserialize, Serialize};

use nominalroll_core::DomainError;

use crate::capabilities::{self, Capabilities};

/// Role used for RBAC.
///
/// Roles form a closed set; everything a role may do is read from its row in
/// the capability table (see [`Role::capabilities`]).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    MainAdmin,
    SpecialAdmin,
    FormationAdmin,
    OfficeAdmin,
    #[serde(rename = "staff")]
    StaffUser,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::MainAdmin,
        Role::SpecialAdmin,
        Role::FormationAdmin,
        Role::OfficeAdmin,
        Role::StaffUser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::MainAdmin => "main_admin",
            Role::SpecialAdmin => "special_admin",
            Role::FormationAdmin => "formation_admin",
            Role::OfficeAdmin => "office_admin",
            Role::StaffUser => "staff",
        }
    }

    /// Precedence used for "outranks" checks (higher wins).
    pub fn precedence(&self) -> u8 {
        match self {
            Role::StaffUser => 0,
            Role::OfficeAdmin => 1,
            Role::FormationAdmin => 2,
            Role::SpecialAdmin => 3,
            Role::MainAdmin => 4,
        }
    }

    pub fn outranks(&self, other: Role) -> bool {
        self.precedence() > other.precedence()
    }

    pub fn capabilities(&self) -> &'static Capabilities {
        match self {
            Role::MainAdmin => &capabilities::MAIN_ADMIN,
            Role::SpecialAdmin => &capabilities::SPECIAL_ADMIN,
            Role::FormationAdmin => &capabilities::FORMATION_ADMIN,
            Role::OfficeAdmin => &capabilities::OFFICE_ADMIN,
            Role::StaffUser => &capabilities::STAFF_USER,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown role '{s}'")))
    }
}
