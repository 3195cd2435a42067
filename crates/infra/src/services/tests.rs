use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;

use nominalroll_auth::{Principal, Role, Scope, ScopeRef, UserAccount};
use nominalroll_core::{
    ExpectedVersion, FormationId, LeaveId, MovementId, NotificationId, OfficeId, PendingEditId, StaffId,
    UserId,
};
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, AuditQuery, EditStatus, Formation, FormationKind, LeaveRequest, LeaveStatus,
    Location, MovementKind, MovementRecord, NewLeave, NewStaff, Notification, Office, PendingEdit, Rank,
    Staff, StaffDelta, StaffFilter, StaffStatus, TargetKind,
};

use super::{
    ImportReport, ImportTarget, MoveOutcome, MoveTarget, NewFormation, NewOffice, NewUser, PersonnelService,
    RoleChange,
};
use crate::export::ExportFormat;
use crate::notify::RecordingSink;
use crate::store::{
    ChangeSet, Committed, EditQuery, InMemoryPersonnelStore, LeaveQuery, PersonnelStore, StoreError,
    UserQuery,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn delta(value: serde_json::Value) -> StaffDelta {
    serde_json::from_value(value).unwrap()
}

struct Fixture {
    service: PersonnelService,
    sink: Arc<RecordingSink>,
    admin: Principal,
    lagos: Formation,
    kano: Formation,
    visa: Office,
    passport: Office,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryPersonnelStore::new())).await
    }

    async fn with_store(store: Arc<dyn PersonnelStore>) -> Self {
        let sink = Arc::new(RecordingSink::default());
        let service = PersonnelService::new(store, sink.clone());
        let admin = Principal::new(UserId::new(), Role::MainAdmin, Scope::Global);

        let lagos = service
            .create_formation(&admin, formation("Lagos Command", "LAG"), now())
            .await
            .unwrap();
        let kano = service
            .create_formation(&admin, formation("Kano Command", "KAN"), now())
            .await
            .unwrap();
        let visa = service
            .create_office(&admin, NewOffice { formation_id: lagos.id, name: "Visa Counter".into() }, now())
            .await
            .unwrap();
        let passport = service
            .create_office(&admin, NewOffice { formation_id: lagos.id, name: "Passport Office".into() }, now())
            .await
            .unwrap();

        Self { service, sink, admin, lagos, kano, visa, passport }
    }

    /// Seed an account directly, skipping password hashing.
    async fn user(&self, role: Role, scope: Option<ScopeRef>) -> Principal {
        let account = UserAccount::new(format!("user-{}", UserId::new()), role, scope, "x".into(), now()).unwrap();
        let audit = AuditLogEntry::new(&self.admin, AuditAction::UserRegistered, TargetKind::User, account.id, now());
        self.service
            .store()
            .commit(ChangeSet::new(audit).insert_user(account.clone()))
            .await
            .unwrap();
        Principal::new(account.id, role, Scope::resolve(role, scope).unwrap())
    }

    async fn staff_in(&self, office: &Office, nis: &str, rank: &str) -> Staff {
        let input: NewStaff = serde_json::from_value(json!({
            "nis_no": nis, "surname": "Bello", "other_names": "Ada", "rank": rank,
            "phone": "08030000000", "formation_id": office.formation_id, "office_id": office.id,
        }))
        .unwrap();
        self.service.create_staff(&self.admin, input, now()).await.unwrap()
    }

    async fn audit_count(&self) -> usize {
        self.service.query_audit(&self.admin, AuditQuery::default()).await.unwrap().len()
    }
}

fn formation(name: &str, code: &str) -> NewFormation {
    NewFormation {
        name: name.into(),
        code: code.into(),
        kind: FormationKind::StateCommand,
        description: None,
    }
}

#[tokio::test]
async fn move_then_read_records_one_movement() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/1", "SI").await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    let passport_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.passport.id))).await;

    let target = MoveTarget { formation_id: None, office_id: Some(fx.passport.id) };
    let outcome = fx.service.move_staff(&lagos_admin, staff.id, target, now()).await.unwrap();
    assert!(matches!(outcome, MoveOutcome::Moved { .. }));

    let read = fx.service.get_staff(&fx.admin, staff.id).await.unwrap();
    assert_eq!(read.office_id, Some(fx.passport.id));
    assert_eq!(read.formation_id, fx.lagos.id);

    let moves = fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].kind, MovementKind::InternalMovement);

    let delivered = fx.sink.delivered();
    assert!(delivered.iter().any(|n| n.recipient_id == passport_admin.user_id));
}

#[tokio::test]
async fn move_to_current_location_records_nothing() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/2", "SI").await;
    let before = fx.audit_count().await;

    let target = MoveTarget { formation_id: Some(fx.lagos.id), office_id: Some(fx.visa.id) };
    let outcome = fx.service.move_staff(&fx.admin, staff.id, target, now()).await.unwrap();

    assert!(matches!(outcome, MoveOutcome::Unchanged(_)));
    assert_eq!(outcome.staff().version, staff.version);
    assert!(fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap().is_empty());
    assert_eq!(fx.audit_count().await, before);
}

#[tokio::test]
async fn postings_need_a_global_admin() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/3", "SI").await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    let kano_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.kano.id))).await;
    let to_kano = MoveTarget { formation_id: Some(fx.kano.id), office_id: None };

    let err = fx.service.move_staff(&lagos_admin, staff.id, to_kano, now()).await.unwrap_err();
    assert!(err.is_forbidden());

    let outcome = fx.service.move_staff(&fx.admin, staff.id, to_kano, now()).await.unwrap();
    let MoveOutcome::Moved { staff: moved, movement } = outcome else {
        panic!("expected a posting");
    };
    assert_eq!(movement.kind, MovementKind::FormationPosting);
    assert_eq!(moved.formation_id, fx.kano.id);
    assert_eq!(moved.office_id, None);
    assert!(fx.sink.delivered().iter().any(|n| n.recipient_id == kano_admin.user_id));
}

#[tokio::test]
async fn office_admins_cannot_move_staff() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/4", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;

    let target = MoveTarget { formation_id: None, office_id: Some(fx.passport.id) };
    let err = fx.service.move_staff(&visa_admin, staff.id, target, now()).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn approve_then_reject_is_a_conflict() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/5", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;

    let edit = fx
        .service
        .submit_edit(&visa_admin, staff.id, delta(json!({"rank": "CSI"})), now())
        .await
        .unwrap();
    fx.service.approve_edit(&lagos_admin, edit.id, None, now()).await.unwrap();

    let err = fx
        .service
        .reject_edit(&lagos_admin, edit.id, Some("too late".into()), now())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn formation_admin_approves_office_admin_edit() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/6", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;

    let edit = fx
        .service
        .submit_edit(&visa_admin, staff.id, delta(json!({"rank": "CSI", "remark": "promoted"})), now())
        .await
        .unwrap();
    assert_eq!(edit.status, EditStatus::Pending);
    assert!(fx.sink.delivered().iter().any(|n| n.recipient_id == lagos_admin.user_id));

    // An office admin does not outrank another office admin.
    let other_office_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let err = fx
        .service
        .approve_edit(&other_office_admin, edit.id, None, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let (approved, updated) = fx.service.approve_edit(&lagos_admin, edit.id, None, now()).await.unwrap();
    assert_eq!(approved.status, EditStatus::Approved);
    assert_eq!(approved.resolution.as_ref().map(|r| r.resolver_id), Some(lagos_admin.user_id));

    // Only the delta's fields changed.
    assert_eq!(updated.rank, Rank::ChiefSuperintendent);
    assert_eq!(updated.remark.as_deref(), Some("promoted"));
    assert_eq!(updated.surname, staff.surname);
    assert_eq!(updated.phone, staff.phone);
    assert_eq!(updated.office_id, staff.office_id);

    let entries = fx
        .service
        .query_audit(
            &fx.admin,
            AuditQuery { action: Some(AuditAction::EditApproved), ..AuditQuery::default() },
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_id, lagos_admin.user_id);
    assert!(fx.sink.delivered().iter().any(|n| n.recipient_id == visa_admin.user_id));
}

#[tokio::test]
async fn staff_user_cannot_edit_own_rank_directly() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/7", "SI").await;
    let me = fx.user(Role::StaffUser, Some(ScopeRef::Staff(staff.id))).await;
    let before = fx.audit_count().await;

    let err = fx
        .service
        .update_staff(&me, staff.id, delta(json!({"rank": "CSI"})), ExpectedVersion::Any, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let read = fx.service.get_staff(&me, staff.id).await.unwrap();
    assert_eq!(read, staff);
    let edits = fx.service.list_pending_edits(&fx.admin, EditQuery::default()).await.unwrap();
    assert!(edits.is_empty());
    assert_eq!(fx.audit_count().await, before);

    // Personal fields are fine.
    let updated = fx
        .service
        .update_staff(&me, staff.id, delta(json!({"phone": "08099999999"})), ExpectedVersion::Exact(staff.version), now())
        .await
        .unwrap();
    assert_eq!(updated.phone.as_deref(), Some("08099999999"));
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/8", "SI").await;
    let err = fx
        .service
        .update_staff(&fx.admin, staff.id, delta(json!({"remark": "x"})), ExpectedVersion::Exact(staff.version + 3), now())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn office_admin_sees_only_their_office() {
    let fx = Fixture::new().await;
    let mine = fx.staff_in(&fx.visa, "NIS/9", "SI").await;
    let theirs = fx.staff_in(&fx.passport, "NIS/10", "CSI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;

    let listed = fx.service.list_staff(&visa_admin, StaffFilter::default()).await.unwrap();
    assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![mine.id]);

    let asking_for_other = StaffFilter { office_id: Some(fx.passport.id), ..StaffFilter::default() };
    assert!(fx.service.list_staff(&visa_admin, asking_for_other).await.unwrap().is_empty());

    // Reads outside scope do not exist; writes outside scope are forbidden.
    assert!(fx.service.get_staff(&visa_admin, theirs.id).await.unwrap_err().is_not_found());
    let err = fx
        .service
        .update_staff(&visa_admin, theirs.id, delta(json!({"remark": "x"})), ExpectedVersion::Any, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn nominal_roll_is_ordered_by_seniority() {
    let fx = Fixture::new().await;
    fx.staff_in(&fx.visa, "NIS/11", "II").await;
    fx.staff_in(&fx.visa, "NIS/12", "CSI").await;
    fx.staff_in(&fx.passport, "NIS/13", "DSI").await;

    let ranks: Vec<Rank> = fx
        .service
        .list_staff(&fx.admin, StaffFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.rank)
        .collect();
    assert_eq!(ranks, vec![Rank::ChiefSuperintendent, Rank::DeputySuperintendent, Rank::Inspector]);
}

#[tokio::test]
async fn every_mutation_writes_one_audit_entry() {
    let fx = Fixture::new().await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;

    let before = fx.audit_count().await;
    let staff = fx.staff_in(&fx.visa, "NIS/14", "SI").await;
    assert_eq!(fx.audit_count().await, before + 1);

    fx.service
        .update_staff(&fx.admin, staff.id, delta(json!({"remark": "ok"})), ExpectedVersion::Any, now())
        .await
        .unwrap();
    assert_eq!(fx.audit_count().await, before + 2);

    let target = MoveTarget { formation_id: None, office_id: Some(fx.passport.id) };
    fx.service.move_staff(&lagos_admin, staff.id, target, now()).await.unwrap();
    assert_eq!(fx.audit_count().await, before + 3);

    fx.service.delete_staff(&fx.admin, staff.id, now()).await.unwrap();
    assert_eq!(fx.audit_count().await, before + 4);
}

#[tokio::test]
async fn failed_operations_write_nothing() {
    let fx = Fixture::new().await;
    fx.staff_in(&fx.visa, "NIS/15", "SI").await;
    let before = fx.audit_count().await;

    let dup: NewStaff = serde_json::from_value(json!({
        "nis_no": "nis/15", "surname": "Musa", "other_names": "Sani", "rank": "II",
        "formation_id": fx.lagos.id,
    }))
    .unwrap();
    assert!(fx.service.create_staff(&fx.admin, dup, now()).await.unwrap_err().is_conflict());

    // Offices with staff cannot be deleted.
    assert!(fx.service.delete_office(&fx.admin, fx.visa.id, now()).await.unwrap_err().is_conflict());
    assert!(fx.service.delete_formation(&fx.admin, fx.lagos.id, now()).await.unwrap_err().is_conflict());

    assert_eq!(fx.audit_count().await, before);
    assert!(fx.service.get_office(&fx.admin, fx.visa.id).await.is_ok());
}

#[tokio::test]
async fn staff_location_must_be_consistent() {
    let fx = Fixture::new().await;
    let input: NewStaff = serde_json::from_value(json!({
        "nis_no": "NIS/16", "surname": "Musa", "other_names": "Sani", "rank": "II",
        "formation_id": fx.kano.id, "office_id": fx.visa.id,
    }))
    .unwrap();
    assert!(fx.service.create_staff(&fx.admin, input, now()).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn leave_workflow() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/17", "SI").await;
    let me = fx.user(Role::StaffUser, Some(ScopeRef::Staff(staff.id))).await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;

    let request = |start: NaiveDate, end: NaiveDate| NewLeave {
        staff_id: staff.id,
        leave_type: nominalroll_personnel::LeaveType::Annual,
        start_date: start,
        end_date: end,
        reason: None,
    };

    let first = fx
        .service
        .request_leave(&me, request(day(2024, 4, 1), day(2024, 4, 10)), now())
        .await
        .unwrap();
    assert!(fx.sink.delivered().iter().any(|n| n.recipient_id == visa_admin.user_id));

    // Staff users cannot decide leave.
    assert!(fx.service.approve_leave(&me, first.id, None, now()).await.unwrap_err().is_forbidden());

    let approved = fx.service.approve_leave(&visa_admin, first.id, None, now()).await.unwrap();
    assert_eq!(approved.status, LeaveStatus::Approved);
    assert!(fx.sink.delivered().iter().any(|n| n.recipient_id == me.user_id));
    assert!(fx.service.reject_leave(&visa_admin, first.id, None, now()).await.unwrap_err().is_conflict());

    let overlapping = request(day(2024, 4, 8), day(2024, 4, 12));
    assert!(fx.service.request_leave(&me, overlapping, now()).await.unwrap_err().is_conflict());

    let backwards = request(day(2024, 5, 8), day(2024, 5, 1));
    assert!(fx.service.request_leave(&me, backwards, now()).await.unwrap_err().is_validation());

    let mine = fx.service.list_leaves(&me, LeaveQuery::default()).await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn retirements_skip_the_comptroller_general() {
    let fx = Fixture::new().await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    let mut ids = Vec::new();
    for (nis, rank, exit) in [("NIS/18", "SI", "2024-01-31"), ("NIS/19", "CGI", "2023-12-31"), ("NIS/20", "SI", "2030-01-01")] {
        let input: NewStaff = serde_json::from_value(json!({
            "nis_no": nis, "surname": "Okafor", "other_names": "Ike", "rank": rank,
            "exit_date": exit, "formation_id": fx.lagos.id, "office_id": fx.visa.id,
        }))
        .unwrap();
        ids.push(fx.service.create_staff(&fx.admin, input, now()).await.unwrap().id);
    }

    assert!(fx.service.process_retirements(&lagos_admin, day(2024, 3, 1), now()).await.unwrap_err().is_forbidden());

    let before = fx.audit_count().await;
    let processed = fx.service.process_retirements(&fx.admin, day(2024, 3, 1), now()).await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(fx.audit_count().await, before + 1);

    let statuses: Vec<StaffStatus> = {
        let mut out = Vec::new();
        for id in &ids {
            out.push(fx.service.get_staff(&fx.admin, *id).await.unwrap().status);
        }
        out
    };
    assert_eq!(statuses, vec![StaffStatus::Retired, StaffStatus::Active, StaffStatus::Active]);
    assert!(fx
        .sink
        .delivered()
        .iter()
        .any(|n| n.recipient_id == lagos_admin.user_id && n.message.contains("31/01/2024")));

    assert_eq!(fx.service.process_retirements(&fx.admin, day(2024, 3, 1), now()).await.unwrap(), 0);
}

#[tokio::test]
async fn user_registration_rules() {
    let fx = Fixture::new().await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    let new_user = |username: &str, role: Role, scope: Option<ScopeRef>| NewUser {
        username: username.into(),
        password: "correct horse".into(),
        role,
        scope,
    };

    let clerk = fx
        .service
        .register_user(&lagos_admin, new_user("visa.clerk", Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))), now())
        .await
        .unwrap();
    assert_ne!(clerk.credential_hash, "correct horse");

    let taken = new_user("visa.clerk", Role::OfficeAdmin, Some(ScopeRef::Office(fx.passport.id)));
    assert!(fx.service.register_user(&fx.admin, taken, now()).await.unwrap_err().is_conflict());

    let upward = new_user("boss", Role::MainAdmin, None);
    assert!(fx.service.register_user(&lagos_admin, upward, now()).await.unwrap_err().is_forbidden());

    let peer = new_user("peer", Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id)));
    assert!(fx.service.register_user(&lagos_admin, peer, now()).await.unwrap_err().is_forbidden());

    let elsewhere = new_user("kano.clerk", Role::FormationAdmin, Some(ScopeRef::Formation(fx.kano.id)));
    assert!(fx.service.register_user(&lagos_admin, elsewhere, now()).await.unwrap_err().is_forbidden());

    let mismatched = new_user("odd", Role::OfficeAdmin, Some(ScopeRef::Formation(fx.lagos.id)));
    assert!(fx.service.register_user(&fx.admin, mismatched, now()).await.unwrap_err().is_validation());

    let dangling = new_user("ghost", Role::StaffUser, Some(ScopeRef::Staff(StaffId::new())));
    assert!(fx.service.register_user(&fx.admin, dangling, now()).await.unwrap_err().is_not_found());

    let visible = fx.service.list_users(&lagos_admin, None).await.unwrap();
    assert!(visible.iter().any(|u| u.id == clerk.id));
    assert!(visible.iter().all(|u| u.role != Role::MainAdmin));
}

#[tokio::test]
async fn inbox_can_be_read_and_marked() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/21", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    fx.service
        .submit_edit(&visa_admin, staff.id, delta(json!({"rank": "DSI"})), now())
        .await
        .unwrap();
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    assert!(fx.service.list_notifications(&lagos_admin, false).await.unwrap().is_empty());

    let edit = fx
        .service
        .submit_edit(&visa_admin, staff.id, delta(json!({"rank": "CSI"})), now())
        .await
        .unwrap();
    let unread = fx.service.list_notifications(&lagos_admin, true).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].staff_id, Some(edit.staff_id));

    // The submitter never notifies themselves.
    assert!(fx.service.list_notifications(&visa_admin, false).await.unwrap().is_empty());

    let read = fx.service.mark_notification_read(&lagos_admin, unread[0].id).await.unwrap();
    assert!(read.read);
    assert!(fx.service.list_notifications(&lagos_admin, true).await.unwrap().is_empty());
    assert!(fx.service.mark_notification_read(&visa_admin, unread[0].id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn exports_render_within_scope() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/22", "SI").await;
    fx.staff_in(&fx.passport, "NIS/23", "CSI").await;
    let me = fx.user(Role::StaffUser, Some(ScopeRef::Staff(staff.id))).await;

    let file = fx
        .service
        .export_staff(&me, StaffFilter::default(), Some("nis_no,surname"), ExportFormat::Xlsx, "HQ", day(2024, 3, 1))
        .await
        .unwrap();
    assert_eq!(file.filename, "staff_list.xlsx");
    assert_eq!(&file.bytes[..2], b"PK");

    let pdf = fx
        .service
        .export_staff(
            &fx.admin,
            StaffFilter { office_id: Some(fx.visa.id), ..StaffFilter::default() },
            None,
            ExportFormat::Pdf,
            "HQ",
            day(2024, 3, 1),
        )
        .await
        .unwrap();
    assert_eq!(pdf.content_type, "application/pdf");
    assert!(pdf.bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn org_listing_is_scoped() {
    let fx = Fixture::new().await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;

    assert_eq!(fx.service.list_formations(&fx.admin).await.unwrap().len(), 2);
    let own = fx.service.list_formations(&visa_admin).await.unwrap();
    assert_eq!(own.iter().map(|f| f.id).collect::<Vec<_>>(), vec![fx.lagos.id]);
    assert!(fx.service.get_formation(&visa_admin, fx.kano.id).await.unwrap_err().is_not_found());

    let offices = fx.service.list_offices(&visa_admin, None).await.unwrap();
    assert_eq!(offices.iter().map(|o| o.id).collect::<Vec<_>>(), vec![fx.visa.id]);

    // Formation admins manage offices in their own formation only.
    let created = fx
        .service
        .create_office(&lagos_admin, NewOffice { formation_id: fx.lagos.id, name: "Border Desk".into() }, now())
        .await
        .unwrap();
    assert_eq!(created.formation_id, fx.lagos.id);
    let err = fx
        .service
        .create_office(&lagos_admin, NewOffice { formation_id: fx.kano.id, name: "Airport".into() }, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    assert!(fx.service.create_formation(&lagos_admin, formation("Abuja", "ABJ"), now()).await.unwrap_err().is_forbidden());
}

#[tokio::test]
async fn dashboard_counts_visible_staff() {
    let fx = Fixture::new().await;
    fx.staff_in(&fx.visa, "NIS/24", "SI").await;
    fx.staff_in(&fx.passport, "NIS/25", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;

    let all = fx.service.dashboard(&fx.admin, day(2024, 3, 1)).await.unwrap();
    let mine = fx.service.dashboard(&visa_admin, day(2024, 3, 1)).await.unwrap();
    assert_eq!(all.total, 2);
    assert_eq!(mine.total, 1);
}

/// Commits a queued change set right after the next staff read, so the
/// reader's snapshot is stale by the time it commits.
#[derive(Default)]
struct InterleavingStore {
    inner: InMemoryPersonnelStore,
    queued: Mutex<Option<ChangeSet>>,
}

impl InterleavingStore {
    fn after_next_read(&self, changes: ChangeSet) {
        *self.queued.lock().unwrap() = Some(changes);
    }
}

#[async_trait]
impl PersonnelStore for InterleavingStore {
    async fn get_staff(&self, id: StaffId) -> Result<Option<Staff>, StoreError> {
        let read = self.inner.get_staff(id).await?;
        let queued = self.queued.lock().unwrap().take();
        if let Some(changes) = queued {
            self.inner.commit(changes).await?;
        }
        Ok(read)
    }
    async fn find_staff_by_nis(&self, nis_no: &str) -> Result<Option<Staff>, StoreError> {
        self.inner.find_staff_by_nis(nis_no).await
    }
    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Staff>, StoreError> {
        self.inner.list_staff(filter).await
    }
    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>, StoreError> {
        self.inner.get_formation(id).await
    }
    async fn list_formations(&self) -> Result<Vec<Formation>, StoreError> {
        self.inner.list_formations().await
    }
    async fn get_office(&self, id: OfficeId) -> Result<Option<Office>, StoreError> {
        self.inner.get_office(id).await
    }
    async fn list_offices(&self, formation_id: Option<FormationId>) -> Result<Vec<Office>, StoreError> {
        self.inner.list_offices(formation_id).await
    }
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        self.inner.get_user(id).await
    }
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, StoreError> {
        self.inner.find_user_by_username(username).await
    }
    async fn list_users(&self, query: &UserQuery) -> Result<Vec<UserAccount>, StoreError> {
        self.inner.list_users(query).await
    }
    async fn get_pending_edit(&self, id: PendingEditId) -> Result<Option<PendingEdit>, StoreError> {
        self.inner.get_pending_edit(id).await
    }
    async fn list_pending_edits(&self, query: &EditQuery) -> Result<Vec<PendingEdit>, StoreError> {
        self.inner.list_pending_edits(query).await
    }
    async fn list_movements(
        &self,
        staff_id: StaffId,
        kind: Option<MovementKind>,
    ) -> Result<Vec<MovementRecord>, StoreError> {
        self.inner.list_movements(staff_id, kind).await
    }
    async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError> {
        self.inner.query_audit(query).await
    }
    async fn get_leave(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
        self.inner.get_leave(id).await
    }
    async fn list_leaves(&self, query: &LeaveQuery) -> Result<Vec<LeaveRequest>, StoreError> {
        self.inner.list_leaves(query).await
    }
    async fn list_notifications(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError> {
        self.inner.list_notifications(recipient_id, unread_only).await
    }
    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<Notification, StoreError> {
        self.inner.mark_notification_read(id, recipient_id).await
    }
    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError> {
        self.inner.commit(changes).await
    }
}

/// A move written by someone else, shaped the way `move_staff` writes it.
fn concurrent_move(admin: &Principal, staff: &Staff, to: Location) -> ChangeSet {
    let from = staff.location();
    let mut moved = staff.clone();
    moved.relocate(to, now());
    let audit = AuditLogEntry::new(admin, AuditAction::StaffMoved, TargetKind::Staff, staff.id, now());
    ChangeSet::new(audit)
        .update_staff(moved, ExpectedVersion::Exact(staff.version))
        .record_movement(MovementRecord {
            id: MovementId::new(),
            staff_id: staff.id,
            kind: MovementKind::InternalMovement,
            from,
            to,
            occurred_at: now(),
            actor_id: admin.user_id,
            actor_role: admin.role,
        })
}

#[tokio::test]
async fn deleting_staff_keeps_their_movement_history() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/40", "SI").await;
    let target = MoveTarget { formation_id: None, office_id: Some(fx.passport.id) };
    fx.service.move_staff(&fx.admin, staff.id, target, now()).await.unwrap();

    fx.service.delete_staff(&fx.admin, staff.id, now()).await.unwrap();
    assert!(fx.service.get_staff(&fx.admin, staff.id).await.unwrap_err().is_not_found());

    let moves = fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].to.office_id, Some(fx.passport.id));

    // Scoped readers lose sight of the record with the record itself.
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    let err = fx.service.list_movements(&lagos_admin, staff.id, None).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn each_accepted_move_records_exactly_one_movement() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/41", "SI").await;
    let to_passport = MoveTarget { formation_id: None, office_id: Some(fx.passport.id) };
    let to_visa = MoveTarget { formation_id: None, office_id: Some(fx.visa.id) };
    let to_kano = MoveTarget { formation_id: Some(fx.kano.id), office_id: None };

    fx.service.move_staff(&fx.admin, staff.id, to_passport, now()).await.unwrap();
    fx.service.move_staff(&fx.admin, staff.id, to_passport, now()).await.unwrap();
    fx.service.move_staff(&fx.admin, staff.id, to_visa, now()).await.unwrap();
    fx.service.move_staff(&fx.admin, staff.id, to_kano, now()).await.unwrap();

    let moves = fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap();
    assert_eq!(moves.len(), 3);
    let postings = fx
        .service
        .list_movements(&fx.admin, staff.id, Some(MovementKind::FormationPosting))
        .await
        .unwrap();
    assert_eq!(postings.len(), 1);

    let read = fx.service.get_staff(&fx.admin, staff.id).await.unwrap();
    assert!(moves.iter().any(|m| m.to == read.location()));
    assert_eq!(read.version, staff.version + 3);
}

#[tokio::test]
async fn approval_after_a_move_keeps_the_new_location() {
    let fx = Fixture::new().await;
    let staff = fx.staff_in(&fx.visa, "NIS/42", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;

    let edit = fx
        .service
        .submit_edit(&visa_admin, staff.id, delta(json!({"rank": "CSI"})), now())
        .await
        .unwrap();
    let target = MoveTarget { formation_id: None, office_id: Some(fx.passport.id) };
    fx.service.move_staff(&fx.admin, staff.id, target, now()).await.unwrap();

    let (_, updated) = fx.service.approve_edit(&fx.admin, edit.id, None, now()).await.unwrap();
    assert_eq!(updated.rank, Rank::ChiefSuperintendent);
    assert_eq!(updated.office_id, Some(fx.passport.id));

    let moves = fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].to, updated.location());
}

#[tokio::test]
async fn approval_racing_a_move_is_a_conflict() {
    let store = Arc::new(InterleavingStore::default());
    let fx = Fixture::with_store(store.clone()).await;
    let staff = fx.staff_in(&fx.visa, "NIS/43", "SI").await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let edit = fx
        .service
        .submit_edit(&visa_admin, staff.id, delta(json!({"rank": "CSI"})), now())
        .await
        .unwrap();

    let passport = Location::new(fx.lagos.id, Some(fx.passport.id));
    store.after_next_read(concurrent_move(&fx.admin, &staff, passport));
    let err = fx.service.approve_edit(&fx.admin, edit.id, None, now()).await.unwrap_err();
    assert!(err.is_conflict());

    let read = fx.service.get_staff(&fx.admin, staff.id).await.unwrap();
    assert_eq!(read.location(), passport);
    assert_eq!(read.rank, Rank::Superintendent);
    let moves = fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].to, read.location());
    let pending = fx.service.get_pending_edit(&fx.admin, edit.id).await.unwrap();
    assert_eq!(pending.status, EditStatus::Pending);
}

#[tokio::test]
async fn move_racing_another_move_is_a_conflict() {
    let store = Arc::new(InterleavingStore::default());
    let fx = Fixture::with_store(store.clone()).await;
    let staff = fx.staff_in(&fx.visa, "NIS/44", "SI").await;

    let passport = Location::new(fx.lagos.id, Some(fx.passport.id));
    store.after_next_read(concurrent_move(&fx.admin, &staff, passport));
    let target = MoveTarget { formation_id: Some(fx.kano.id), office_id: None };
    let err = fx.service.move_staff(&fx.admin, staff.id, target, now()).await.unwrap_err();
    assert!(err.is_conflict());

    let read = fx.service.get_staff(&fx.admin, staff.id).await.unwrap();
    assert_eq!(read.location(), passport);
    assert_eq!(fx.service.list_movements(&fx.admin, staff.id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unversioned_update_racing_a_move_is_a_conflict() {
    let store = Arc::new(InterleavingStore::default());
    let fx = Fixture::with_store(store.clone()).await;
    let staff = fx.staff_in(&fx.visa, "NIS/45", "SI").await;

    let passport = Location::new(fx.lagos.id, Some(fx.passport.id));
    store.after_next_read(concurrent_move(&fx.admin, &staff, passport));
    let err = fx
        .service
        .update_staff(&fx.admin, staff.id, delta(json!({"remark": "x"})), ExpectedVersion::Any, now())
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(fx.service.get_staff(&fx.admin, staff.id).await.unwrap().location(), passport);
}

fn sheet(rows: &[&[&str]]) -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, text) in row.iter().enumerate() {
            if !text.is_empty() {
                worksheet.write_string(r as u32, c as u16, *text).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

const IMPORT_HEADER: &[&str] = &["NIS/No", "Surname", "Other Names", "Rank", "State of Origin", "LGA", "Office"];

#[tokio::test]
async fn import_reports_bad_rows_and_keeps_the_rest() {
    let fx = Fixture::new().await;
    fx.staff_in(&fx.visa, "NIS/60", "SI").await;
    let before = fx.audit_count().await;

    let bytes = sheet(&[
        IMPORT_HEADER,
        &["NIS/61", "Okafor", "Chidi", "ASI 1", "lagos", "ikeja", "visa counter"],
        &["NIS/62", "Musa", "Ali", "General", "", "", ""],
        &["NIS/63", "Eze", "Ngozi", "SI", "", "", "Cargo Desk"],
        &["NIS/60", "Bello", "Ada", "SI", "", "", ""],
        &["", "Nobody", "Here", "SI", "", "", ""],
        &["NIS/64", "Abubakar", "Sani", "II", "Lagos", "Nassarawa", ""],
        &["NIS/65", "Ojo", "Tunde", "CSI", "", "", ""],
    ]);
    let target = ImportTarget { formation_id: Some(fx.lagos.id), office_id: None };
    let report = fx.service.import_staff(&fx.admin, &bytes, target, now()).await.unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.iter().map(|e| e.row).collect::<Vec<_>>(), vec![3, 4, 5, 7]);
    assert!(report.errors[1].message.contains("Cargo Desk"));
    assert_eq!(fx.audit_count().await, before + 2);

    let store = fx.service.store();
    let okafor = store.find_staff_by_nis("NIS/61").await.unwrap().unwrap();
    assert_eq!(okafor.office_id, Some(fx.visa.id));
    assert_eq!(okafor.rank, Rank::AssistantSuperintendent1);
    assert_eq!(okafor.state_of_origin.as_deref(), Some("Lagos"));
    assert_eq!(okafor.lga.as_deref(), Some("Ikeja"));
    let ojo = store.find_staff_by_nis("NIS/65").await.unwrap().unwrap();
    assert_eq!((ojo.formation_id, ojo.office_id), (fx.lagos.id, None));
}

#[tokio::test]
async fn office_admin_imports_into_their_own_office() {
    let fx = Fixture::new().await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let bytes = sheet(&[IMPORT_HEADER, &["NIS/66", "Okafor", "Chidi", "SI", "", "", ""]]);

    let report = fx
        .service
        .import_staff(&visa_admin, &bytes, ImportTarget::default(), now())
        .await
        .unwrap();
    assert_eq!(report, ImportReport { created: 1, skipped: 0, errors: Vec::new() });
    let staff = fx.service.store().find_staff_by_nis("NIS/66").await.unwrap().unwrap();
    assert_eq!(staff.office_id, Some(fx.visa.id));

    let elsewhere = ImportTarget { formation_id: None, office_id: Some(fx.passport.id) };
    let err = fx.service.import_staff(&visa_admin, &bytes, elsewhere, now()).await.unwrap_err();
    assert!(err.is_forbidden());
}

#[tokio::test]
async fn import_rejects_unusable_uploads() {
    let fx = Fixture::new().await;
    let lagos = ImportTarget { formation_id: Some(fx.lagos.id), office_id: None };

    let err = fx.service.import_staff(&fx.admin, b"nis,surname\n", lagos, now()).await.unwrap_err();
    assert!(err.is_validation());

    let headless = sheet(&[&["Surname", "Rank"], &["Bello", "SI"]]);
    let err = fx.service.import_staff(&fx.admin, &headless, lagos, now()).await.unwrap_err();
    assert!(err.is_validation());

    let good = sheet(&[IMPORT_HEADER, &["NIS/67", "Bello", "Ada", "SI", "", "", ""]]);
    let err = fx
        .service
        .import_staff(&fx.admin, &good, ImportTarget::default(), now())
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let mismatched = ImportTarget { formation_id: Some(fx.kano.id), office_id: Some(fx.visa.id) };
    let err = fx.service.import_staff(&fx.admin, &good, mismatched, now()).await.unwrap_err();
    assert!(err.is_validation());

    let staff_user = fx.user(Role::StaffUser, Some(ScopeRef::Staff(StaffId::new()))).await;
    let err = fx.service.import_staff(&staff_user, &good, lagos, now()).await.unwrap_err();
    assert!(err.is_forbidden());
    assert!(fx.service.store().find_staff_by_nis("NIS/67").await.unwrap().is_none());
}

#[tokio::test]
async fn import_template_lists_every_column() {
    let fx = Fixture::new().await;
    let file = fx.service.import_template().unwrap();
    let rows = crate::import::read_sheet(&file.bytes).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].staff_fields().len(), crate::import::ImportColumn::ALL.len() - 1);
}

#[tokio::test]
async fn role_change_writes_one_audit_entry_and_tells_the_user() {
    let fx = Fixture::new().await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let before = fx.audit_count().await;

    let change = RoleChange { role: Role::FormationAdmin, scope: Some(ScopeRef::Formation(fx.kano.id)) };
    let account = fx
        .service
        .change_user_role(&fx.admin, visa_admin.user_id, change, now())
        .await
        .unwrap();
    assert_eq!(account.role, Role::FormationAdmin);
    assert_eq!(account.scope, Some(ScopeRef::Formation(fx.kano.id)));

    let stored = fx.service.store().get_user(visa_admin.user_id).await.unwrap().unwrap();
    assert_eq!((stored.role, stored.scope), (account.role, account.scope));

    let audit = fx.service.query_audit(&fx.admin, AuditQuery::default()).await.unwrap();
    assert_eq!(audit.len(), before + 1);
    let entry = audit.iter().find(|e| e.action == AuditAction::UserRoleChanged).unwrap();
    assert_eq!(entry.diff.as_ref().unwrap()["from"]["role"], "office_admin");
    assert!(fx.sink.delivered().iter().any(|n| n.recipient_id == visa_admin.user_id));

    let again = RoleChange { role: Role::FormationAdmin, scope: Some(ScopeRef::Formation(fx.kano.id)) };
    fx.service
        .change_user_role(&fx.admin, visa_admin.user_id, again, now())
        .await
        .unwrap();
    assert_eq!(fx.audit_count().await, before + 1);
}

#[tokio::test]
async fn formation_admins_change_roles_below_them_at_home() {
    let fx = Fixture::new().await;
    let lagos_admin = fx.user(Role::FormationAdmin, Some(ScopeRef::Formation(fx.lagos.id))).await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;
    let kano_office = fx
        .service
        .create_office(&fx.admin, NewOffice { formation_id: fx.kano.id, name: "Airport".into() }, now())
        .await
        .unwrap();

    let to_passport = RoleChange { role: Role::OfficeAdmin, scope: Some(ScopeRef::Office(fx.passport.id)) };
    let moved = fx
        .service
        .change_user_role(&lagos_admin, visa_admin.user_id, to_passport, now())
        .await
        .unwrap();
    assert_eq!(moved.scope, Some(ScopeRef::Office(fx.passport.id)));

    let to_kano = RoleChange { role: Role::OfficeAdmin, scope: Some(ScopeRef::Office(kano_office.id)) };
    let err = fx
        .service
        .change_user_role(&lagos_admin, visa_admin.user_id, to_kano, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let peer = RoleChange { role: Role::FormationAdmin, scope: Some(ScopeRef::Formation(fx.lagos.id)) };
    let err = fx
        .service
        .change_user_role(&lagos_admin, visa_admin.user_id, peer, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let special = fx.user(Role::SpecialAdmin, None).await;
    let demote = RoleChange { role: Role::OfficeAdmin, scope: Some(ScopeRef::Office(fx.visa.id)) };
    let err = fx
        .service
        .change_user_role(&lagos_admin, special.user_id, demote, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
    let stored = fx.service.store().get_user(special.user_id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::SpecialAdmin);
}

#[tokio::test]
async fn role_change_rejects_self_bad_scope_and_unknown_users() {
    let fx = Fixture::new().await;
    let special = fx.user(Role::SpecialAdmin, None).await;
    let visa_admin = fx.user(Role::OfficeAdmin, Some(ScopeRef::Office(fx.visa.id))).await;

    let to_main = RoleChange { role: Role::MainAdmin, scope: None };
    let err = fx
        .service
        .change_user_role(&special, visa_admin.user_id, to_main.clone(), now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let err = fx
        .service
        .change_user_role(&special, special.user_id, RoleChange { role: Role::OfficeAdmin, scope: None }, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let wrong_scope = RoleChange { role: Role::FormationAdmin, scope: Some(ScopeRef::Office(fx.visa.id)) };
    let err = fx
        .service
        .change_user_role(&fx.admin, visa_admin.user_id, wrong_scope, now())
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .service
        .change_user_role(&fx.admin, UserId::new(), to_main, now())
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let office_admin = RoleChange { role: Role::OfficeAdmin, scope: Some(ScopeRef::Office(fx.passport.id)) };
    let err = fx
        .service
        .change_user_role(&visa_admin, special.user_id, office_admin, now())
        .await
        .unwrap_err();
    assert!(err.is_forbidden());
}
