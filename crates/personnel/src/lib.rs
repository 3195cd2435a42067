//! `nominalroll-personnel`: pure personnel domain.
//!
//! Staff records, the formation/office tree, movements, pending edits, leave,
//! audit entries and notifications. No IO; every rule here is deterministic and
//! unit-tested. Authorization and persistence are composed on top of these
//! types by `nominalroll-infra`.

pub mod audit;
pub mod dates;
pub mod field;
pub mod filter;
pub mod leave;
pub mod movement;
pub mod notification;
pub mod org;
pub mod origin;
pub mod pending_edit;
pub mod rank;
pub mod staff;
pub mod summary;

pub use audit::{AuditAction, AuditLogEntry, AuditQuery, TargetKind};
pub use dates::{format_dmy, parse_date};
pub use field::{FieldValue, StaffDelta, StaffField};
pub use filter::{DateRange, StaffFilter, roll_order};
pub use leave::{LeaveRequest, LeaveStatus, LeaveType, NewLeave};
pub use movement::{Location, MovementKind, MovementRecord, classify_move};
pub use notification::Notification;
pub use org::{Formation, FormationKind, FormationPatch, Office};
pub use origin::{Lga, StateOfOrigin, find_state, resolve_origin};
pub use pending_edit::{EditStatus, PendingEdit, Resolution};
pub use rank::{Cadre, Rank};
pub use staff::{Gender, NewStaff, RestrictedFields, Staff, StaffStatus, StaffView};
pub use summary::{DashboardSummary, FormationCount, RankCount};
