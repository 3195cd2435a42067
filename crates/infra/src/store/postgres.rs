//! Postgres-backed personnel store.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |------------|---------------|--------------|
//! | unique violation | `23505` | `Conflict` |
//! | foreign key violation | `23503` | `Conflict` (row still referenced) |
//! | check violation | `23514` | `Conflict` |
//! | anything else | - | `Backend` |
//!
//! Each [`ChangeSet`] is applied inside one transaction. Guarded rows (pending
//! edits, leave requests) are locked with `SELECT ... FOR UPDATE` before their
//! status is re-checked, so two racing approvers cannot both commit.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use nominalroll_auth::{Role, ScopeRef, UserAccount};
use nominalroll_core::{
    AuditEntryId, FormationId, LeaveId, MovementId, NotificationId, OfficeId, PendingEditId,
    StaffId, UserId,
};
use nominalroll_personnel::{
    AuditLogEntry, AuditQuery, DateRange, EditStatus, Formation, LeaveRequest, LeaveStatus,
    Location, MovementKind, MovementRecord, Notification, Office, PendingEdit, Resolution, Staff,
    StaffDelta, StaffFilter,
};

use super::{
    ChangeSet, Committed, EditQuery, FormationWrite, LeaveQuery, OfficeWrite, PersonnelStore,
    StaffWrite, StoreError, UserQuery, UserWrite,
};

const MIGRATION: &str = include_str!("../../../../migrations/0001_init.sql");

const STAFF_COLUMNS: &str = "id, nis_no, surname, other_names, rank, gender, dob, dofa, dopa, \
    dopp, exit_date, state_of_origin, lga, home_town, qualification, phone, email, next_of_kin, \
    nok_phone, remark, formation_id, office_id, status, version, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, role, scope_kind, scope_id, credential_hash, created_at";

const EDIT_COLUMNS: &str = "id, staff_id, delta, submitter_id, submitter_role, status, \
    submitted_at, resolver_id, resolver_role, resolved_at, note";

const MOVEMENT_COLUMNS: &str = "id, staff_id, kind, from_formation_id, from_office_id, \
    to_formation_id, to_office_id, occurred_at, actor_id, actor_role";

const LEAVE_COLUMNS: &str = "id, staff_id, leave_type, start_date, end_date, reason, status, \
    requested_by, requested_at, decided_by, decided_at, decision_note";

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, message, staff_id, created_at, read";

const AUDIT_COLUMNS: &str =
    "id, actor_id, actor_role, action, target_kind, target_id, occurred_at, diff";

#[derive(Debug, Clone)]
pub struct PostgresPersonnelStore {
    pool: Arc<PgPool>,
}

impl PostgresPersonnelStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

/// Paging arguments arrive as `usize`; Postgres takes a signed BIGINT.
fn sql_count(what: &str, n: usize) -> Result<i64, StoreError> {
    i64::try_from(n).map_err(|_| StoreError::Invalid(format!("{what} {n} is out of range")))
}

fn corrupt(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode {what} row: {err}"))
}

fn parse_col<T>(what: &str, raw: String) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse().map_err(|e| corrupt(what, e))
}

fn parse_opt_col<T>(what: &str, raw: Option<String>) -> Result<Option<T>, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.map(|r| parse_col(what, r)).transpose()
}

fn staff_from_row(row: &PgRow) -> Result<Staff, StoreError> {
    let get = |e: sqlx::Error| corrupt("staff", e);
    Ok(Staff {
        id: StaffId::from_uuid(row.try_get("id").map_err(get)?),
        nis_no: row.try_get("nis_no").map_err(get)?,
        surname: row.try_get("surname").map_err(get)?,
        other_names: row.try_get("other_names").map_err(get)?,
        rank: parse_col("staff", row.try_get("rank").map_err(get)?)?,
        gender: parse_opt_col("staff", row.try_get("gender").map_err(get)?)?,
        dob: row.try_get("dob").map_err(get)?,
        dofa: row.try_get("dofa").map_err(get)?,
        dopa: row.try_get("dopa").map_err(get)?,
        dopp: row.try_get("dopp").map_err(get)?,
        exit_date: row.try_get("exit_date").map_err(get)?,
        state_of_origin: row.try_get("state_of_origin").map_err(get)?,
        lga: row.try_get("lga").map_err(get)?,
        home_town: row.try_get("home_town").map_err(get)?,
        qualification: row.try_get("qualification").map_err(get)?,
        phone: row.try_get("phone").map_err(get)?,
        email: row.try_get("email").map_err(get)?,
        next_of_kin: row.try_get("next_of_kin").map_err(get)?,
        nok_phone: row.try_get("nok_phone").map_err(get)?,
        remark: row.try_get("remark").map_err(get)?,
        formation_id: FormationId::from_uuid(row.try_get("formation_id").map_err(get)?),
        office_id: row
            .try_get::<Option<Uuid>, _>("office_id")
            .map_err(get)?
            .map(OfficeId::from_uuid),
        status: parse_col("staff", row.try_get("status").map_err(get)?)?,
        version: row.try_get::<i64, _>("version").map_err(get)? as u64,
        created_at: row.try_get("created_at").map_err(get)?,
        updated_at: row.try_get("updated_at").map_err(get)?,
    })
}

fn formation_from_row(row: &PgRow) -> Result<Formation, StoreError> {
    let get = |e: sqlx::Error| corrupt("formation", e);
    Ok(Formation {
        id: FormationId::from_uuid(row.try_get("id").map_err(get)?),
        name: row.try_get("name").map_err(get)?,
        code: row.try_get("code").map_err(get)?,
        kind: parse_col("formation", row.try_get("kind").map_err(get)?)?,
        description: row.try_get("description").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

fn office_from_row(row: &PgRow) -> Result<Office, StoreError> {
    let get = |e: sqlx::Error| corrupt("office", e);
    Ok(Office {
        id: OfficeId::from_uuid(row.try_get("id").map_err(get)?),
        formation_id: FormationId::from_uuid(row.try_get("formation_id").map_err(get)?),
        name: row.try_get("name").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

fn scope_columns(scope: Option<ScopeRef>) -> (Option<&'static str>, Option<Uuid>) {
    match scope {
        None => (None, None),
        Some(ScopeRef::Formation(id)) => (Some("formation"), Some(id.into())),
        Some(ScopeRef::Office(id)) => (Some("office"), Some(id.into())),
        Some(ScopeRef::Staff(id)) => (Some("staff"), Some(id.into())),
    }
}

fn user_from_row(row: &PgRow) -> Result<UserAccount, StoreError> {
    let get = |e: sqlx::Error| corrupt("user", e);
    let scope_kind: Option<String> = row.try_get("scope_kind").map_err(get)?;
    let scope_id: Option<Uuid> = row.try_get("scope_id").map_err(get)?;
    let scope = match (scope_kind.as_deref(), scope_id) {
        (None, _) => None,
        (Some("formation"), Some(id)) => Some(ScopeRef::Formation(id.into())),
        (Some("office"), Some(id)) => Some(ScopeRef::Office(id.into())),
        (Some("staff"), Some(id)) => Some(ScopeRef::Staff(id.into())),
        (Some(kind), _) => return Err(corrupt("user", format!("bad scope '{kind}'"))),
    };
    Ok(UserAccount {
        id: UserId::from_uuid(row.try_get("id").map_err(get)?),
        username: row.try_get("username").map_err(get)?,
        role: parse_col("user", row.try_get("role").map_err(get)?)?,
        scope,
        credential_hash: row.try_get("credential_hash").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

fn edit_from_row(row: &PgRow) -> Result<PendingEdit, StoreError> {
    let get = |e: sqlx::Error| corrupt("pending edit", e);
    let delta: serde_json::Value = row.try_get("delta").map_err(get)?;
    let delta: StaffDelta =
        serde_json::from_value(delta).map_err(|e| corrupt("pending edit", e))?;
    let resolver_id: Option<Uuid> = row.try_get("resolver_id").map_err(get)?;
    let resolver_role: Option<Role> =
        parse_opt_col("pending edit", row.try_get("resolver_role").map_err(get)?)?;
    let resolved_at = row.try_get("resolved_at").map_err(get)?;
    let resolution = match (resolver_id, resolver_role, resolved_at) {
        (Some(id), Some(role), Some(at)) => Some(Resolution {
            resolver_id: UserId::from_uuid(id),
            resolver_role: role,
            resolved_at: at,
            note: row.try_get("note").map_err(get)?,
        }),
        _ => None,
    };
    Ok(PendingEdit {
        id: PendingEditId::from_uuid(row.try_get("id").map_err(get)?),
        staff_id: StaffId::from_uuid(row.try_get("staff_id").map_err(get)?),
        delta,
        submitter_id: UserId::from_uuid(row.try_get("submitter_id").map_err(get)?),
        submitter_role: parse_col("pending edit", row.try_get("submitter_role").map_err(get)?)?,
        status: parse_col("pending edit", row.try_get("status").map_err(get)?)?,
        submitted_at: row.try_get("submitted_at").map_err(get)?,
        resolution,
    })
}

fn movement_from_row(row: &PgRow) -> Result<MovementRecord, StoreError> {
    let get = |e: sqlx::Error| corrupt("movement", e);
    let office = |col: &str| -> Result<Option<OfficeId>, StoreError> {
        Ok(row
            .try_get::<Option<Uuid>, _>(col)
            .map_err(get)?
            .map(OfficeId::from_uuid))
    };
    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get("id").map_err(get)?),
        staff_id: StaffId::from_uuid(row.try_get("staff_id").map_err(get)?),
        kind: parse_col("movement", row.try_get("kind").map_err(get)?)?,
        from: Location::new(
            FormationId::from_uuid(row.try_get("from_formation_id").map_err(get)?),
            office("from_office_id")?,
        ),
        to: Location::new(
            FormationId::from_uuid(row.try_get("to_formation_id").map_err(get)?),
            office("to_office_id")?,
        ),
        occurred_at: row.try_get("occurred_at").map_err(get)?,
        actor_id: UserId::from_uuid(row.try_get("actor_id").map_err(get)?),
        actor_role: parse_col("movement", row.try_get("actor_role").map_err(get)?)?,
    })
}

fn leave_from_row(row: &PgRow) -> Result<LeaveRequest, StoreError> {
    let get = |e: sqlx::Error| corrupt("leave", e);
    Ok(LeaveRequest {
        id: LeaveId::from_uuid(row.try_get("id").map_err(get)?),
        staff_id: StaffId::from_uuid(row.try_get("staff_id").map_err(get)?),
        leave_type: parse_col("leave", row.try_get("leave_type").map_err(get)?)?,
        start_date: row.try_get("start_date").map_err(get)?,
        end_date: row.try_get("end_date").map_err(get)?,
        reason: row.try_get("reason").map_err(get)?,
        status: parse_col("leave", row.try_get("status").map_err(get)?)?,
        requested_by: UserId::from_uuid(row.try_get("requested_by").map_err(get)?),
        requested_at: row.try_get("requested_at").map_err(get)?,
        decided_by: row
            .try_get::<Option<Uuid>, _>("decided_by")
            .map_err(get)?
            .map(UserId::from_uuid),
        decided_at: row.try_get("decided_at").map_err(get)?,
        decision_note: row.try_get("decision_note").map_err(get)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let get = |e: sqlx::Error| corrupt("notification", e);
    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get("id").map_err(get)?),
        recipient_id: UserId::from_uuid(row.try_get("recipient_id").map_err(get)?),
        message: row.try_get("message").map_err(get)?,
        staff_id: row
            .try_get::<Option<Uuid>, _>("staff_id")
            .map_err(get)?
            .map(StaffId::from_uuid),
        created_at: row.try_get("created_at").map_err(get)?,
        read: row.try_get("read").map_err(get)?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditLogEntry, StoreError> {
    let get = |e: sqlx::Error| corrupt("audit", e);
    Ok(AuditLogEntry {
        id: AuditEntryId::from_uuid(row.try_get("id").map_err(get)?),
        actor_id: UserId::from_uuid(row.try_get("actor_id").map_err(get)?),
        actor_role: parse_col("audit", row.try_get("actor_role").map_err(get)?)?,
        action: parse_col("audit", row.try_get("action").map_err(get)?)?,
        target_kind: parse_col("audit", row.try_get("target_kind").map_err(get)?)?,
        target_id: row.try_get("target_id").map_err(get)?,
        occurred_at: row.try_get("occurred_at").map_err(get)?,
        diff: row.try_get("diff").map_err(get)?,
    })
}

fn decode_all<T>(
    rows: Vec<PgRow>,
    decode: impl Fn(&PgRow) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    rows.iter().map(decode).collect()
}

fn push_range(qb: &mut QueryBuilder<'_, Postgres>, column: &str, range: &DateRange) {
    if let Some(from) = range.from {
        qb.push(format_args!(" AND {column} >= ")).push_bind(from);
    }
    if let Some(to) = range.to {
        qb.push(format_args!(" AND {column} <= ")).push_bind(to);
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

async fn write_staff(
    tx: &mut Transaction<'_, Postgres>,
    write: &StaffWrite,
) -> Result<(), StoreError> {
    let staff = match write {
        StaffWrite::Delete(id) => {
            let done = sqlx::query("DELETE FROM staff WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_staff", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("staff {id}")));
            }
            return Ok(());
        }
        StaffWrite::Insert(staff) => staff,
        StaffWrite::Update { staff, expected } => {
            let row = sqlx::query("SELECT version FROM staff WHERE id = $1 FOR UPDATE")
                .bind(staff.id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("lock_staff", e))?
                .ok_or_else(|| StoreError::NotFound(format!("staff {}", staff.id)))?;
            let stored: i64 = row.try_get("version").map_err(|e| corrupt("staff", e))?;
            expected.check(stored as u64)?;
            staff
        }
    };

    if let Some(office_id) = staff.office_id {
        let row = sqlx::query("SELECT formation_id FROM offices WHERE id = $1")
            .bind(office_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("check_office", e))?
            .ok_or_else(|| StoreError::NotFound(format!("office {office_id}")))?;
        let formation: Uuid = row.try_get("formation_id").map_err(|e| corrupt("office", e))?;
        if formation != *staff.formation_id.as_uuid() {
            return Err(StoreError::Conflict(format!(
                "office {office_id} does not belong to formation {}",
                staff.formation_id
            )));
        }
    }

    sqlx::query(
        r#"
        INSERT INTO staff (
            id, nis_no, surname, other_names, rank, rank_seniority, gender, dob, dofa, dopa,
            dopp, exit_date, state_of_origin, lga, home_town, qualification, phone, email,
            next_of_kin, nok_phone, remark, formation_id, office_id, status, version,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
        ON CONFLICT (id) DO UPDATE SET
            nis_no = EXCLUDED.nis_no,
            surname = EXCLUDED.surname,
            other_names = EXCLUDED.other_names,
            rank = EXCLUDED.rank,
            rank_seniority = EXCLUDED.rank_seniority,
            gender = EXCLUDED.gender,
            dob = EXCLUDED.dob,
            dofa = EXCLUDED.dofa,
            dopa = EXCLUDED.dopa,
            dopp = EXCLUDED.dopp,
            exit_date = EXCLUDED.exit_date,
            state_of_origin = EXCLUDED.state_of_origin,
            lga = EXCLUDED.lga,
            home_town = EXCLUDED.home_town,
            qualification = EXCLUDED.qualification,
            phone = EXCLUDED.phone,
            email = EXCLUDED.email,
            next_of_kin = EXCLUDED.next_of_kin,
            nok_phone = EXCLUDED.nok_phone,
            remark = EXCLUDED.remark,
            formation_id = EXCLUDED.formation_id,
            office_id = EXCLUDED.office_id,
            status = EXCLUDED.status,
            version = EXCLUDED.version,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(staff.id.as_uuid())
    .bind(&staff.nis_no)
    .bind(&staff.surname)
    .bind(&staff.other_names)
    .bind(staff.rank.code())
    .bind(staff.rank.seniority())
    .bind(staff.gender.map(|g| g.as_str()))
    .bind(staff.dob)
    .bind(staff.dofa)
    .bind(staff.dopa)
    .bind(staff.dopp)
    .bind(staff.exit_date)
    .bind(&staff.state_of_origin)
    .bind(&staff.lga)
    .bind(&staff.home_town)
    .bind(&staff.qualification)
    .bind(&staff.phone)
    .bind(&staff.email)
    .bind(&staff.next_of_kin)
    .bind(&staff.nok_phone)
    .bind(&staff.remark)
    .bind(staff.formation_id.as_uuid())
    .bind(staff.office_id.map(Uuid::from))
    .bind(staff.status.as_str())
    .bind(staff.version as i64)
    .bind(staff.created_at)
    .bind(staff.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_staff", e))?;
    Ok(())
}

async fn write_formation(
    tx: &mut Transaction<'_, Postgres>,
    write: &FormationWrite,
) -> Result<(), StoreError> {
    match write {
        FormationWrite::Upsert(f) => {
            sqlx::query(
                r#"
                INSERT INTO formations (id, name, code, kind, description, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    code = EXCLUDED.code,
                    kind = EXCLUDED.kind,
                    description = EXCLUDED.description
                "#,
            )
            .bind(f.id.as_uuid())
            .bind(&f.name)
            .bind(&f.code)
            .bind(f.kind.as_str())
            .bind(&f.description)
            .bind(f.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("write_formation", e))?;
        }
        FormationWrite::Delete(id) => {
            let done = sqlx::query("DELETE FROM formations WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_formation", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("formation {id}")));
            }
        }
    }
    Ok(())
}

async fn write_office(
    tx: &mut Transaction<'_, Postgres>,
    write: &OfficeWrite,
) -> Result<(), StoreError> {
    match write {
        OfficeWrite::Upsert(o) => {
            sqlx::query(
                r#"
                INSERT INTO offices (id, formation_id, name, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
                "#,
            )
            .bind(o.id.as_uuid())
            .bind(o.formation_id.as_uuid())
            .bind(&o.name)
            .bind(o.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("write_office", e))?;
        }
        OfficeWrite::Delete(id) => {
            let done = sqlx::query("DELETE FROM offices WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_office", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("office {id}")));
            }
        }
    }
    Ok(())
}

async fn write_user(tx: &mut Transaction<'_, Postgres>, write: &UserWrite) -> Result<(), StoreError> {
    match write {
        UserWrite::Insert(user) => {
            let (scope_kind, scope_id) = scope_columns(user.scope);
            sqlx::query(
                r#"
                INSERT INTO users (id, username, role, scope_kind, scope_id, credential_hash, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(user.id.as_uuid())
            .bind(&user.username)
            .bind(user.role.as_str())
            .bind(scope_kind)
            .bind(scope_id)
            .bind(&user.credential_hash)
            .bind(user.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        }
        UserWrite::Assign { id, role, scope } => {
            let (scope_kind, scope_id) = scope_columns(*scope);
            let done = sqlx::query(
                "UPDATE users SET role = $2, scope_kind = $3, scope_id = $4 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .bind(role.as_str())
            .bind(scope_kind)
            .bind(scope_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("assign_user_role", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
        }
    }
    Ok(())
}

/// Lock the stored row and return its status column, if any.
async fn lock_status(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    id: Uuid,
) -> Result<Option<String>, StoreError> {
    let row = sqlx::query(&format!("SELECT status FROM {table} WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_status", e))?;
    row.map(|r| r.try_get::<String, _>("status").map_err(|e| corrupt(table, e)))
        .transpose()
}

async fn write_pending_edit(
    tx: &mut Transaction<'_, Postgres>,
    edit: &PendingEdit,
) -> Result<(), StoreError> {
    let stored = lock_status(tx, "pending_edits", *edit.id.as_uuid()).await?;
    match stored.as_deref() {
        Some(status) if status != EditStatus::Pending.as_str() => {
            return Err(StoreError::Conflict(format!(
                "pending edit {} is already {status}",
                edit.id
            )));
        }
        None if edit.status != EditStatus::Pending => {
            return Err(StoreError::NotFound(format!("pending edit {}", edit.id)));
        }
        _ => {}
    }

    let resolution = edit.resolution.as_ref();
    sqlx::query(
        r#"
        INSERT INTO pending_edits (
            id, staff_id, delta, submitter_id, submitter_role, status, submitted_at,
            resolver_id, resolver_role, resolved_at, note
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            resolver_id = EXCLUDED.resolver_id,
            resolver_role = EXCLUDED.resolver_role,
            resolved_at = EXCLUDED.resolved_at,
            note = EXCLUDED.note
        "#,
    )
    .bind(edit.id.as_uuid())
    .bind(edit.staff_id.as_uuid())
    .bind(edit.delta.to_json())
    .bind(edit.submitter_id.as_uuid())
    .bind(edit.submitter_role.as_str())
    .bind(edit.status.as_str())
    .bind(edit.submitted_at)
    .bind(resolution.map(|r| Uuid::from(r.resolver_id)))
    .bind(resolution.map(|r| r.resolver_role.as_str()))
    .bind(resolution.map(|r| r.resolved_at))
    .bind(resolution.and_then(|r| r.note.clone()))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_pending_edit", e))?;
    Ok(())
}

async fn write_leave(tx: &mut Transaction<'_, Postgres>, leave: &LeaveRequest) -> Result<(), StoreError> {
    let stored = lock_status(tx, "leaves", *leave.id.as_uuid()).await?;
    match stored.as_deref() {
        Some(status) if status != LeaveStatus::Pending.as_str() => {
            return Err(StoreError::Conflict(format!(
                "leave {} is already {status}",
                leave.id
            )));
        }
        None if leave.status != LeaveStatus::Pending => {
            return Err(StoreError::NotFound(format!("leave {}", leave.id)));
        }
        _ => {}
    }

    sqlx::query(
        r#"
        INSERT INTO leaves (
            id, staff_id, leave_type, start_date, end_date, reason, status, requested_by,
            requested_at, decided_by, decided_at, decision_note
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            decided_by = EXCLUDED.decided_by,
            decided_at = EXCLUDED.decided_at,
            decision_note = EXCLUDED.decision_note
        "#,
    )
    .bind(leave.id.as_uuid())
    .bind(leave.staff_id.as_uuid())
    .bind(leave.leave_type.as_str())
    .bind(leave.start_date)
    .bind(leave.end_date)
    .bind(&leave.reason)
    .bind(leave.status.as_str())
    .bind(leave.requested_by.as_uuid())
    .bind(leave.requested_at)
    .bind(leave.decided_by.map(Uuid::from))
    .bind(leave.decided_at)
    .bind(&leave.decision_note)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_leave", e))?;
    Ok(())
}

async fn write_movement(
    tx: &mut Transaction<'_, Postgres>,
    m: &MovementRecord,
) -> Result<(), StoreError> {
    // No foreign key on movements; the row must still name a live record.
    let done = sqlx::query(
        r#"
        INSERT INTO movements (
            id, staff_id, kind, from_formation_id, from_office_id, to_formation_id,
            to_office_id, occurred_at, actor_id, actor_role
        )
        SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
        WHERE EXISTS (SELECT 1 FROM staff WHERE id = $2)
        "#,
    )
    .bind(m.id.as_uuid())
    .bind(m.staff_id.as_uuid())
    .bind(m.kind.as_str())
    .bind(m.from.formation_id.as_uuid())
    .bind(m.from.office_id.map(Uuid::from))
    .bind(m.to.formation_id.as_uuid())
    .bind(m.to.office_id.map(Uuid::from))
    .bind(m.occurred_at)
    .bind(m.actor_id.as_uuid())
    .bind(m.actor_role.as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;
    if done.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("staff {}", m.staff_id)));
    }
    Ok(())
}

async fn write_notification(
    tx: &mut Transaction<'_, Postgres>,
    n: &Notification,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, recipient_id, message, staff_id, created_at, read)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(n.id.as_uuid())
    .bind(n.recipient_id.as_uuid())
    .bind(&n.message)
    .bind(n.staff_id.map(Uuid::from))
    .bind(n.created_at)
    .bind(n.read)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_notification", e))?;
    Ok(())
}

async fn write_audit(tx: &mut Transaction<'_, Postgres>, a: &AuditLogEntry) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, actor_id, actor_role, action, target_kind, target_id, occurred_at, diff
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(a.id.as_uuid())
    .bind(a.actor_id.as_uuid())
    .bind(a.actor_role.as_str())
    .bind(a.action.as_str())
    .bind(a.target_kind.as_str())
    .bind(a.target_id)
    .bind(a.occurred_at)
    .bind(&a.diff)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_audit", e))?;
    Ok(())
}

async fn apply_changes(
    tx: &mut Transaction<'_, Postgres>,
    changes: &ChangeSet,
) -> Result<(), StoreError> {
    for w in changes.formations.iter().filter(|w| matches!(w, FormationWrite::Upsert(_))) {
        write_formation(tx, w).await?;
    }
    for w in changes.offices.iter().filter(|w| matches!(w, OfficeWrite::Upsert(_))) {
        write_office(tx, w).await?;
    }
    for w in &changes.staff {
        write_staff(tx, w).await?;
    }
    for w in changes.offices.iter().filter(|w| matches!(w, OfficeWrite::Delete(_))) {
        write_office(tx, w).await?;
    }
    for w in changes.formations.iter().filter(|w| matches!(w, FormationWrite::Delete(_))) {
        write_formation(tx, w).await?;
    }
    for u in &changes.users {
        write_user(tx, u).await?;
    }
    for e in &changes.pending_edits {
        write_pending_edit(tx, e).await?;
    }
    for l in &changes.leaves {
        write_leave(tx, l).await?;
    }
    for m in &changes.movements {
        write_movement(tx, m).await?;
    }
    for n in &changes.notifications {
        write_notification(tx, n).await?;
    }
    write_audit(tx, changes.audit()).await
}

#[async_trait]
impl PersonnelStore for PostgresPersonnelStore {
    #[instrument(skip(self), fields(staff_id = %id), err)]
    async fn get_staff(&self, id: StaffId) -> Result<Option<Staff>, StoreError> {
        let row = sqlx::query(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_staff", e))?;
        row.as_ref().map(staff_from_row).transpose()
    }

    async fn find_staff_by_nis(&self, nis_no: &str) -> Result<Option<Staff>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff WHERE UPPER(nis_no) = UPPER($1)"
        ))
        .bind(nis_no.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_staff_by_nis", e))?;
        row.as_ref().map(staff_from_row).transpose()
    }

    #[instrument(skip(self, filter), fields(rows = tracing::field::Empty), err)]
    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Staff>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {STAFF_COLUMNS} FROM staff WHERE TRUE"
        ));

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (surname ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR other_names ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR nis_no ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR (surname || ' ' || other_names) ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if !filter.ranks.is_empty() {
            let codes: Vec<String> = filter.ranks.iter().map(|r| r.code().to_string()).collect();
            qb.push(" AND rank = ANY(").push_bind(codes).push(")");
        }
        if let Some(f) = filter.formation_id {
            qb.push(" AND formation_id = ").push_bind(Uuid::from(f));
        }
        if let Some(o) = filter.office_id {
            qb.push(" AND office_id = ").push_bind(Uuid::from(o));
        }
        if let Some(s) = filter.staff_id {
            qb.push(" AND id = ").push_bind(Uuid::from(s));
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(gender) = filter.gender {
            qb.push(" AND gender = ").push_bind(gender.as_str());
        }
        push_range(&mut qb, "dob", &filter.dob);
        push_range(&mut qb, "dopa", &filter.dopa);
        push_range(&mut qb, "exit_date", &filter.exit_date);

        qb.push(" ORDER BY rank_seniority DESC, LOWER(surname), LOWER(other_names), id");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(sql_count("limit", limit)?);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(sql_count("offset", offset)?);
        }

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_staff", e))?;
        Span::current().record("rows", rows.len());
        decode_all(rows, staff_from_row)
    }

    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, code, kind, description, created_at FROM formations WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_formation", e))?;
        row.as_ref().map(formation_from_row).transpose()
    }

    async fn list_formations(&self) -> Result<Vec<Formation>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, code, kind, description, created_at FROM formations ORDER BY name",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_formations", e))?;
        decode_all(rows, formation_from_row)
    }

    async fn get_office(&self, id: OfficeId) -> Result<Option<Office>, StoreError> {
        let row = sqlx::query("SELECT id, formation_id, name, created_at FROM offices WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_office", e))?;
        row.as_ref().map(office_from_row).transpose()
    }

    async fn list_offices(&self, formation_id: Option<FormationId>) -> Result<Vec<Office>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, formation_id, name, created_at FROM offices
            WHERE ($1::uuid IS NULL OR formation_id = $1)
            ORDER BY name
            "#,
        )
        .bind(formation_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_offices", e))?;
        decode_all(rows, office_from_row)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<UserAccount>, StoreError> {
        let (scope_kind, scope_id) = scope_columns(query.scope);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::text IS NULL OR (scope_kind = $2 AND scope_id = $3))
            ORDER BY username
            "#
        ))
        .bind(query.role.map(|r| r.as_str()))
        .bind(scope_kind)
        .bind(scope_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;
        decode_all(rows, user_from_row)
    }

    async fn get_pending_edit(&self, id: PendingEditId) -> Result<Option<PendingEdit>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EDIT_COLUMNS} FROM pending_edits WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_pending_edit", e))?;
        row.as_ref().map(edit_from_row).transpose()
    }

    async fn list_pending_edits(&self, query: &EditQuery) -> Result<Vec<PendingEdit>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EDIT_COLUMNS} FROM pending_edits
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR staff_id = $2)
            ORDER BY submitted_at DESC, id DESC
            "#
        ))
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.staff_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_pending_edits", e))?;
        decode_all(rows, edit_from_row)
    }

    async fn list_movements(
        &self,
        staff_id: StaffId,
        kind: Option<MovementKind>,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS} FROM movements
            WHERE staff_id = $1 AND ($2::text IS NULL OR kind = $2)
            ORDER BY occurred_at DESC, id DESC
            "#
        ))
        .bind(staff_id.as_uuid())
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;
        decode_all(rows, movement_from_row)
    }

    #[instrument(skip(self, query), err)]
    async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE TRUE"));
        if let Some(actor) = query.actor_id {
            qb.push(" AND actor_id = ").push_bind(Uuid::from(actor));
        }
        if let Some(kind) = query.target_kind {
            qb.push(" AND target_kind = ").push_bind(kind.as_str());
        }
        if let Some(target) = query.target_id {
            qb.push(" AND target_id = ").push_bind(target);
        }
        if let Some(action) = query.action {
            qb.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(from) = query.from {
            qb.push(" AND occurred_at >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            qb.push(" AND occurred_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY occurred_at DESC, id DESC LIMIT ")
            .push_bind(sql_count("limit", query.effective_limit())?)
            .push(" OFFSET ")
            .push_bind(sql_count("offset", query.effective_offset())?);

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_audit", e))?;
        decode_all(rows, audit_from_row)
    }

    async fn get_leave(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
        let row = sqlx::query(&format!("SELECT {LEAVE_COLUMNS} FROM leaves WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_leave", e))?;
        row.as_ref().map(leave_from_row).transpose()
    }

    async fn list_leaves(&self, query: &LeaveQuery) -> Result<Vec<LeaveRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LEAVE_COLUMNS} FROM leaves
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR staff_id = $2)
            ORDER BY requested_at DESC, id DESC
            "#
        ))
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.staff_id.map(Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_leaves", e))?;
        decode_all(rows, leave_from_row)
    }

    async fn list_notifications(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR NOT read)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(recipient_id.as_uuid())
        .bind(unread_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_notifications", e))?;
        decode_all(rows, notification_from_row)
    }

    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<Notification, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE notifications SET read = TRUE
            WHERE id = $1 AND recipient_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(recipient_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_notification_read", e))?
        .ok_or_else(|| StoreError::NotFound(format!("notification {id}")))?;
        notification_from_row(&row)
    }

    #[instrument(
        skip(self, changes),
        fields(
            action = changes.audit().action.as_str(),
            target_id = %changes.audit().target_id
        ),
        err
    )]
    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Err(err) = apply_changes(&mut tx, &changes).await {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(err);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Committed {
            audit_id: changes.audit().id,
            notifications: changes.notifications,
        })
    }
}
