//! Role → capability table.
//!
//! Each role maps to exactly one [`Capabilities`] row. Handlers look the row up
//! once (via the principal) instead of branching on role names.

use serde::Serialize;

/// How far a role's visibility reaches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    Formation,
    Office,
    OwnRecord,
}

/// Write-sensitivity tier of a staff field.
///
/// Ordered: a role may directly write every tier up to and including its own
/// `write_tier`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTier {
    Personal,
    Administrative,
    Restricted,
}

/// One row of the capability table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub scope_kind: ScopeKind,
    /// Highest field tier the role may write without approval.
    pub write_tier: FieldTier,
    /// Whether restricted fields are visible to the role.
    pub read_restricted: bool,
    pub create_staff: bool,
    pub delete_staff: bool,
    pub internal_move: bool,
    pub formation_posting: bool,
    pub approve_edits: bool,
    pub manage_formations: bool,
    pub manage_offices: bool,
    pub register_users: bool,
    pub view_audit: bool,
    pub process_retirements: bool,
    pub decide_leave: bool,
}

impl Capabilities {
    pub fn can_write(&self, tier: FieldTier) -> bool {
        tier <= self.write_tier
    }
}

pub static MAIN_ADMIN: Capabilities = Capabilities {
    scope_kind: ScopeKind::Global,
    write_tier: FieldTier::Restricted,
    read_restricted: true,
    create_staff: true,
    delete_staff: true,
    internal_move: true,
    formation_posting: true,
    approve_edits: true,
    manage_formations: true,
    manage_offices: true,
    register_users: true,
    view_audit: true,
    process_retirements: true,
    decide_leave: true,
};

pub static SPECIAL_ADMIN: Capabilities = Capabilities {
    scope_kind: ScopeKind::Global,
    write_tier: FieldTier::Restricted,
    read_restricted: true,
    create_staff: true,
    delete_staff: true,
    internal_move: true,
    formation_posting: true,
    approve_edits: true,
    manage_formations: true,
    manage_offices: true,
    register_users: true,
    view_audit: true,
    process_retirements: true,
    decide_leave: true,
};

pub static FORMATION_ADMIN: Capabilities = Capabilities {
    scope_kind: ScopeKind::Formation,
    write_tier: FieldTier::Restricted,
    read_restricted: true,
    create_staff: true,
    delete_staff: false,
    internal_move: true,
    formation_posting: false,
    approve_edits: true,
    manage_formations: false,
    manage_offices: true,
    register_users: true,
    view_audit: false,
    process_retirements: false,
    decide_leave: true,
};

pub static OFFICE_ADMIN: Capabilities = Capabilities {
    scope_kind: ScopeKind::Office,
    write_tier: FieldTier::Administrative,
    read_restricted: true,
    create_staff: true,
    delete_staff: false,
    internal_move: false,
    formation_posting: false,
    approve_edits: false,
    manage_formations: false,
    manage_offices: false,
    register_users: false,
    view_audit: false,
    process_retirements: false,
    decide_leave: true,
};

pub static STAFF_USER: Capabilities = Capabilities {
    scope_kind: ScopeKind::OwnRecord,
    write_tier: FieldTier::Personal,
    read_restricted: false,
    create_staff: false,
    delete_staff: false,
    internal_move: false,
    formation_posting: false,
    approve_edits: false,
    manage_formations: false,
    manage_offices: false,
    register_users: false,
    view_audit: false,
    process_retirements: false,
    decide_leave: false,
};
