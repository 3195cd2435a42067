use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::instrument;

use nominalroll_auth::{Role, ScopeRef, UserAccount};
use nominalroll_core::{
    FormationId, LeaveId, NotificationId, OfficeId, PendingEditId, StaffId, UserId,
};
use nominalroll_personnel::{
    AuditLogEntry, AuditQuery, EditStatus, Formation, LeaveRequest, LeaveStatus, MovementKind,
    MovementRecord, Notification, Office, PendingEdit, Staff, StaffFilter, roll_order,
};

use super::{
    ChangeSet, Committed, EditQuery, FormationWrite, LeaveQuery, OfficeWrite, PersonnelStore,
    StaffWrite, StoreError, UserQuery, UserWrite,
};

#[derive(Debug, Default)]
struct State {
    staff: HashMap<StaffId, Staff>,
    formations: HashMap<FormationId, Formation>,
    offices: HashMap<OfficeId, Office>,
    users: HashMap<UserId, UserAccount>,
    pending_edits: HashMap<PendingEditId, PendingEdit>,
    leaves: HashMap<LeaveId, LeaveRequest>,
    movements: Vec<MovementRecord>,
    audit: Vec<AuditLogEntry>,
    notifications: Vec<Notification>,
}

/// Prior value of one entity slot touched by a commit.
enum Undo {
    Staff(StaffId, Option<Staff>),
    Formation(FormationId, Option<Formation>),
    Office(OfficeId, Option<Office>),
    User(UserId),
    UserRole(UserId, Role, Option<ScopeRef>),
    PendingEdit(PendingEditId, Option<PendingEdit>),
    Leave(LeaveId, Option<LeaveRequest>),
    NotificationStaff(usize, StaffId),
}

fn restore<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, prev: Option<V>) {
    match prev {
        Some(v) => {
            map.insert(key, v);
        }
        None => {
            map.remove(&key);
        }
    }
}

/// In-memory personnel store.
///
/// Intended for tests/dev. A commit applies its writes in place under the
/// write lock, journaling each overwritten slot, and replays the journal
/// backwards if any check fails. History rows are appended last.
#[derive(Debug, Default)]
pub struct InMemoryPersonnelStore {
    state: RwLock<State>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl InMemoryPersonnelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> Result<R, StoreError> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(f(&state))
    }
}

impl State {
    fn check_staff_refs(&self, staff: &Staff) -> Result<(), StoreError> {
        if !self.formations.contains_key(&staff.formation_id) {
            return Err(StoreError::NotFound(format!("formation {}", staff.formation_id)));
        }
        if let Some(office_id) = staff.office_id {
            let office = self
                .offices
                .get(&office_id)
                .ok_or_else(|| StoreError::NotFound(format!("office {office_id}")))?;
            if office.formation_id != staff.formation_id {
                return Err(StoreError::Conflict(format!(
                    "office {office_id} does not belong to formation {}",
                    staff.formation_id
                )));
            }
        }
        let duplicate = self
            .staff
            .values()
            .any(|s| s.id != staff.id && s.nis_no.eq_ignore_ascii_case(&staff.nis_no));
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "service number {} is already in use",
                staff.nis_no
            )));
        }
        Ok(())
    }

    fn apply_staff(&mut self, write: StaffWrite, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        match write {
            StaffWrite::Insert(staff) => {
                if self.staff.contains_key(&staff.id) {
                    return Err(StoreError::Conflict(format!("staff {} already exists", staff.id)));
                }
                self.check_staff_refs(&staff)?;
                let id = staff.id;
                undo.push(Undo::Staff(id, self.staff.insert(id, staff)));
            }
            StaffWrite::Update { staff, expected } => {
                let stored = self
                    .staff
                    .get(&staff.id)
                    .ok_or_else(|| StoreError::NotFound(format!("staff {}", staff.id)))?;
                expected.check(stored.version)?;
                self.check_staff_refs(&staff)?;
                let id = staff.id;
                undo.push(Undo::Staff(id, self.staff.insert(id, staff)));
            }
            StaffWrite::Delete(id) => {
                let removed = self
                    .staff
                    .remove(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("staff {id}")))?;
                undo.push(Undo::Staff(id, Some(removed)));

                let edits: Vec<_> = self
                    .pending_edits
                    .values()
                    .filter(|e| e.staff_id == id)
                    .map(|e| e.id)
                    .collect();
                for edit_id in edits {
                    undo.push(Undo::PendingEdit(edit_id, self.pending_edits.remove(&edit_id)));
                }
                let leaves: Vec<_> = self
                    .leaves
                    .values()
                    .filter(|l| l.staff_id == id)
                    .map(|l| l.id)
                    .collect();
                for leave_id in leaves {
                    undo.push(Undo::Leave(leave_id, self.leaves.remove(&leave_id)));
                }
                // Movement history is append-only and stays behind.
                for (idx, n) in self.notifications.iter_mut().enumerate() {
                    if n.staff_id == Some(id) {
                        n.staff_id = None;
                        undo.push(Undo::NotificationStaff(idx, id));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_formation(&mut self, write: FormationWrite, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        match write {
            FormationWrite::Upsert(formation) => {
                let clash = self.formations.values().any(|f| {
                    f.id != formation.id
                        && (f.name.eq_ignore_ascii_case(&formation.name)
                            || f.code.eq_ignore_ascii_case(&formation.code))
                });
                if clash {
                    return Err(StoreError::Conflict(format!(
                        "formation name '{}' or code '{}' is already in use",
                        formation.name, formation.code
                    )));
                }
                let id = formation.id;
                undo.push(Undo::Formation(id, self.formations.insert(id, formation)));
            }
            FormationWrite::Delete(id) => {
                if !self.formations.contains_key(&id) {
                    return Err(StoreError::NotFound(format!("formation {id}")));
                }
                if self.offices.values().any(|o| o.formation_id == id)
                    || self.staff.values().any(|s| s.formation_id == id)
                {
                    return Err(StoreError::Conflict(format!(
                        "formation {id} still has offices or staff"
                    )));
                }
                undo.push(Undo::Formation(id, self.formations.remove(&id)));
            }
        }
        Ok(())
    }

    fn apply_office(&mut self, write: OfficeWrite, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        match write {
            OfficeWrite::Upsert(office) => {
                if !self.formations.contains_key(&office.formation_id) {
                    return Err(StoreError::NotFound(format!("formation {}", office.formation_id)));
                }
                let clash = self.offices.values().any(|o| {
                    o.id != office.id && o.formation_id == office.formation_id && o.same_name(&office.name)
                });
                if clash {
                    return Err(StoreError::Conflict(format!(
                        "office '{}' already exists in this formation",
                        office.name
                    )));
                }
                let id = office.id;
                undo.push(Undo::Office(id, self.offices.insert(id, office)));
            }
            OfficeWrite::Delete(id) => {
                if !self.offices.contains_key(&id) {
                    return Err(StoreError::NotFound(format!("office {id}")));
                }
                if self.staff.values().any(|s| s.office_id == Some(id)) {
                    return Err(StoreError::Conflict(format!("office {id} still has staff")));
                }
                undo.push(Undo::Office(id, self.offices.remove(&id)));
            }
        }
        Ok(())
    }

    fn apply_user(&mut self, write: UserWrite, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        match write {
            UserWrite::Insert(user) => {
                let clash = self
                    .users
                    .values()
                    .any(|u| u.id == user.id || u.username.eq_ignore_ascii_case(&user.username));
                if clash {
                    return Err(StoreError::Conflict(format!(
                        "username '{}' is already taken",
                        user.username
                    )));
                }
                undo.push(Undo::User(user.id));
                self.users.insert(user.id, user);
            }
            UserWrite::Assign { id, role, scope } => {
                let stored = self
                    .users
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
                undo.push(Undo::UserRole(id, stored.role, stored.scope));
                stored.role = role;
                stored.scope = scope;
            }
        }
        Ok(())
    }

    fn apply_pending_edit(&mut self, edit: PendingEdit, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        if !self.staff.contains_key(&edit.staff_id) {
            return Err(StoreError::NotFound(format!("staff {}", edit.staff_id)));
        }
        match self.pending_edits.get(&edit.id) {
            Some(stored) if stored.status.is_terminal() => {
                return Err(StoreError::Conflict(format!(
                    "pending edit {} is already {}",
                    edit.id,
                    stored.status.as_str()
                )));
            }
            None if edit.status != EditStatus::Pending => {
                return Err(StoreError::NotFound(format!("pending edit {}", edit.id)));
            }
            _ => {}
        }
        let id = edit.id;
        undo.push(Undo::PendingEdit(id, self.pending_edits.insert(id, edit)));
        Ok(())
    }

    fn apply_leave(&mut self, leave: LeaveRequest, undo: &mut Vec<Undo>) -> Result<(), StoreError> {
        if !self.staff.contains_key(&leave.staff_id) {
            return Err(StoreError::NotFound(format!("staff {}", leave.staff_id)));
        }
        match self.leaves.get(&leave.id) {
            Some(stored) if stored.status != LeaveStatus::Pending => {
                return Err(StoreError::Conflict(format!(
                    "leave {} is already {}",
                    leave.id,
                    stored.status.as_str()
                )));
            }
            None if leave.status != LeaveStatus::Pending => {
                return Err(StoreError::NotFound(format!("leave {}", leave.id)));
            }
            _ => {}
        }
        let id = leave.id;
        undo.push(Undo::Leave(id, self.leaves.insert(id, leave)));
        Ok(())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Staff(id, prev) => restore(&mut self.staff, id, prev),
                Undo::Formation(id, prev) => restore(&mut self.formations, id, prev),
                Undo::Office(id, prev) => restore(&mut self.offices, id, prev),
                Undo::User(id) => {
                    self.users.remove(&id);
                }
                Undo::UserRole(id, role, scope) => {
                    if let Some(user) = self.users.get_mut(&id) {
                        user.role = role;
                        user.scope = scope;
                    }
                }
                Undo::PendingEdit(id, prev) => restore(&mut self.pending_edits, id, prev),
                Undo::Leave(id, prev) => restore(&mut self.leaves, id, prev),
                Undo::NotificationStaff(idx, id) => {
                    if let Some(n) = self.notifications.get_mut(idx) {
                        n.staff_id = Some(id);
                    }
                }
            }
        }
    }

    fn apply_entities(
        &mut self,
        changes: EntityWrites,
        undo: &mut Vec<Undo>,
    ) -> Result<(), StoreError> {
        let EntityWrites {
            staff,
            formations,
            offices,
            users,
            pending_edits,
            leaves,
        } = changes;

        let (formation_deletes, formation_upserts): (Vec<_>, Vec<_>) = formations
            .into_iter()
            .partition(|w| matches!(w, FormationWrite::Delete(_)));
        let (office_deletes, office_upserts): (Vec<_>, Vec<_>) = offices
            .into_iter()
            .partition(|w| matches!(w, OfficeWrite::Delete(_)));

        for w in formation_upserts {
            self.apply_formation(w, undo)?;
        }
        for w in office_upserts {
            self.apply_office(w, undo)?;
        }
        for w in staff {
            self.apply_staff(w, undo)?;
        }
        for w in office_deletes {
            self.apply_office(w, undo)?;
        }
        for w in formation_deletes {
            self.apply_formation(w, undo)?;
        }
        for u in users {
            self.apply_user(u, undo)?;
        }
        for e in pending_edits {
            self.apply_pending_edit(e, undo)?;
        }
        for l in leaves {
            self.apply_leave(l, undo)?;
        }
        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let ChangeSet {
            audit,
            staff,
            formations,
            offices,
            users,
            movements,
            pending_edits,
            leaves,
            notifications,
        } = changes;

        let mut undo = Vec::new();
        let entities = EntityWrites {
            staff,
            formations,
            offices,
            users,
            pending_edits,
            leaves,
        };
        let checked = self.apply_entities(entities, &mut undo).and_then(|()| {
            match movements.iter().find(|m| !self.staff.contains_key(&m.staff_id)) {
                Some(m) => Err(StoreError::NotFound(format!("staff {}", m.staff_id))),
                None => Ok(()),
            }
        });
        if let Err(e) = checked {
            self.rollback(undo);
            return Err(e);
        }

        self.movements.extend(movements);
        self.notifications.extend(notifications.iter().cloned());
        let audit_id = audit.id;
        self.audit.push(audit);

        Ok(Committed {
            audit_id,
            notifications,
        })
    }
}

struct EntityWrites {
    staff: Vec<StaffWrite>,
    formations: Vec<FormationWrite>,
    offices: Vec<OfficeWrite>,
    users: Vec<UserWrite>,
    pending_edits: Vec<PendingEdit>,
    leaves: Vec<LeaveRequest>,
}

fn newest_first<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl PersonnelStore for InMemoryPersonnelStore {
    async fn get_staff(&self, id: StaffId) -> Result<Option<Staff>, StoreError> {
        self.read(|s| s.staff.get(&id).cloned())
    }

    async fn find_staff_by_nis(&self, nis_no: &str) -> Result<Option<Staff>, StoreError> {
        self.read(|s| {
            s.staff
                .values()
                .find(|st| st.nis_no.eq_ignore_ascii_case(nis_no.trim()))
                .cloned()
        })
    }

    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Staff>, StoreError> {
        let mut rows = self.read(|s| {
            s.staff
                .values()
                .filter(|st| filter.matches(st))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        rows.sort_by(roll_order);
        Ok(filter.page(rows))
    }

    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>, StoreError> {
        self.read(|s| s.formations.get(&id).cloned())
    }

    async fn list_formations(&self) -> Result<Vec<Formation>, StoreError> {
        let mut rows = self.read(|s| s.formations.values().cloned().collect::<Vec<_>>())?;
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_office(&self, id: OfficeId) -> Result<Option<Office>, StoreError> {
        self.read(|s| s.offices.get(&id).cloned())
    }

    async fn list_offices(&self, formation_id: Option<FormationId>) -> Result<Vec<Office>, StoreError> {
        let mut rows = self.read(|s| {
            s.offices
                .values()
                .filter(|o| formation_id.is_none_or(|f| o.formation_id == f))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        self.read(|s| s.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, StoreError> {
        self.read(|s| {
            s.users
                .values()
                .find(|u| u.username.eq_ignore_ascii_case(username.trim()))
                .cloned()
        })
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<UserAccount>, StoreError> {
        let mut rows = self.read(|s| {
            s.users
                .values()
                .filter(|u| query.role.is_none_or(|r| u.role == r))
                .filter(|u| query.scope.is_none_or(|sc| u.scope == Some(sc)))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        rows.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(rows)
    }

    async fn get_pending_edit(&self, id: PendingEditId) -> Result<Option<PendingEdit>, StoreError> {
        self.read(|s| s.pending_edits.get(&id).cloned())
    }

    async fn list_pending_edits(&self, query: &EditQuery) -> Result<Vec<PendingEdit>, StoreError> {
        let rows = self.read(|s| {
            s.pending_edits
                .values()
                .filter(|e| query.status.is_none_or(|st| e.status == st))
                .filter(|e| query.staff_id.is_none_or(|id| e.staff_id == id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(newest_first(rows, |e| (e.submitted_at, e.id)))
    }

    async fn list_movements(
        &self,
        staff_id: StaffId,
        kind: Option<MovementKind>,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = self.read(|s| {
            s.movements
                .iter()
                .filter(|m| m.staff_id == staff_id && kind.is_none_or(|k| m.kind == k))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(newest_first(rows, |m| (m.occurred_at, m.id)))
    }

    async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let rows = self.read(|s| {
            s.audit
                .iter()
                .filter(|e| query.matches(e))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(newest_first(rows, |e| (e.occurred_at, e.id))
            .into_iter()
            .skip(query.effective_offset())
            .take(query.effective_limit())
            .collect())
    }

    async fn get_leave(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
        self.read(|s| s.leaves.get(&id).cloned())
    }

    async fn list_leaves(&self, query: &LeaveQuery) -> Result<Vec<LeaveRequest>, StoreError> {
        let rows = self.read(|s| {
            s.leaves
                .values()
                .filter(|l| query.status.is_none_or(|st| l.status == st))
                .filter(|l| query.staff_id.is_none_or(|id| l.staff_id == id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(newest_first(rows, |l| (l.requested_at, l.id)))
    }

    async fn list_notifications(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = self.read(|s| {
            s.notifications
                .iter()
                .filter(|n| n.recipient_id == recipient_id && !(unread_only && n.read))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        Ok(newest_first(rows, |n| (n.created_at, n.id)))
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<Notification, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        let row = state
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {id}")))?;
        row.read = true;
        Ok(row.clone())
    }

    #[instrument(skip(self, changes), fields(action = changes.audit().action.as_str()), err)]
    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.apply(changes)
    }
}
