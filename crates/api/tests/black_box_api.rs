use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use nominalroll_api::config::ApiConfig;
use nominalroll_auth::{JwtClaims, Role, ScopeRef};
use nominalroll_core::{OfficeId, StaffId, UserId};
use reqwest::StatusCode;
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let app = nominalroll_api::app::build_app(ApiConfig::for_testing(SECRET))
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn patch(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Create a formation with one office and return both ids.
    async fn seed_org(&self, token: &str, code: &str) -> (String, String) {
        let res = self
            .post(
                token,
                "/formations",
                json!({ "name": format!("{code} State Command"), "code": code, "kind": "state_command" }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let formation: Value = res.json().await.unwrap();
        let formation_id = formation["id"].as_str().unwrap().to_string();

        let res = self
            .post(
                token,
                "/offices",
                json!({ "formation_id": formation_id, "name": "Visa Office" }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let office: Value = res.json().await.unwrap();
        (formation_id, office["id"].as_str().unwrap().to_string())
    }

    async fn seed_staff(&self, token: &str, formation_id: &str, office_id: &str, nis: &str) -> Value {
        let res = self
            .post(
                token,
                "/staff",
                json!({
                    "nis_no": nis,
                    "surname": "Bello",
                    "other_names": "Amina",
                    "rank": "II",
                    "dob": "1985-04-12",
                    "dofa": "2010-01-04",
                    "formation_id": formation_id,
                    "office_id": office_id,
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(role: Role, scope: Option<ScopeRef>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        role,
        scope,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token() -> String {
    mint_jwt(Role::MainAdmin, None)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = srv.get("not-a-jwt", "/staff").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_with_scope_mismatch_is_rejected() {
    let srv = TestServer::spawn().await;
    // Office admins must carry an office scope.
    let token = mint_jwt(Role::OfficeAdmin, None);
    let res = srv.get(&token, "/whoami").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whoami_reports_role_and_scope() {
    let srv = TestServer::spawn().await;
    let office_id = OfficeId::new();
    let token = mint_jwt(Role::OfficeAdmin, Some(ScopeRef::Office(office_id)));

    let res = srv.get(&token, "/whoami").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "office_admin");
    assert_eq!(body["scope"]["kind"], "office");
    assert_eq!(body["scope"]["id"], office_id.to_string());
    assert_eq!(body["capabilities"]["read_restricted"], false);
    assert!(body["username"].is_null());
}

#[tokio::test]
async fn registered_user_is_resolved_by_whoami() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (_, visa) = srv.seed_org(&admin, "LAG").await;

    let res = srv
        .post(
            &admin,
            "/users",
            json!({
                "username": "visa.admin",
                "password": "correct horse",
                "role": "office_admin",
                "scope": { "kind": "office", "id": visa },
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let user: Value = res.json().await.unwrap();
    assert!(user.get("credential_hash").is_none());

    let now = Utc::now();
    let claims = JwtClaims {
        sub: user["id"].as_str().unwrap().parse().unwrap(),
        role: Role::OfficeAdmin,
        scope: Some(ScopeRef::Office(visa.parse().unwrap())),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let res = srv.get(&token, "/whoami").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["username"], "visa.admin");

    // Same username twice.
    let res = srv
        .post(
            &admin,
            "/users",
            json!({ "username": "visa.admin", "password": "another one", "role": "main_admin" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_builds_org_and_roll() {
    let srv = TestServer::spawn().await;
    let token = admin_token();
    let (formation_id, office_id) = srv.seed_org(&token, "LAG").await;

    let staff = srv.seed_staff(&token, &formation_id, &office_id, "NIS-1001").await;
    assert_eq!(staff["nis_no"], "NIS-1001");
    assert_eq!(staff["rank"], "II");
    assert_eq!(staff["version"], 1);

    let res = srv.get(&token, &format!("/staff?formation_id={formation_id}")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let res = srv.get(&token, "/offices").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    // Duplicate service numbers are refused.
    let res = srv
        .post(
            &token,
            "/staff",
            json!({
                "nis_no": "NIS-1001",
                "surname": "Okafor",
                "other_names": "Chidi",
                "rank": "SII",
                "formation_id": formation_id,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let res = srv.get(&admin_token(), "/staff/not-a-uuid").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn office_admin_only_sees_own_office() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;
    let (kano, kano_office) = srv.seed_org(&admin, "KAN").await;

    let mine = srv.seed_staff(&admin, &lagos, &visa, "NIS-1").await;
    let theirs = srv.seed_staff(&admin, &kano, &kano_office, "NIS-2").await;

    let token = mint_jwt(Role::OfficeAdmin, Some(ScopeRef::Office(visa.parse().unwrap())));

    let res = srv.get(&token, "/staff").await;
    let body: Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], mine["id"]);
    // Restricted fields are hidden from office admins.
    assert!(items[0].get("nis_no").is_none());

    let res = srv
        .get(&token, &format!("/staff/{}", theirs["id"].as_str().unwrap()))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_user_cannot_change_own_rank_directly() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;
    let staff = srv.seed_staff(&admin, &lagos, &visa, "NIS-7").await;
    let staff_id: StaffId = staff["id"].as_str().unwrap().parse().unwrap();

    let token = mint_jwt(Role::StaffUser, Some(ScopeRef::Staff(staff_id)));
    let path = format!("/staff/{staff_id}");

    let res = srv.patch(&token, &path, json!({ "rank": "SII" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .patch(&token, &path, json!({ "phone": "08030000000", "expected_version": 1 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["phone"], "08030000000");
    assert_eq!(body["version"], 2);

    // A stale version is a conflict.
    let res = srv
        .patch(&token, &path, json!({ "phone": "08031111111", "expected_version": 1 }))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn pending_edit_is_applied_on_approval() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;
    let staff = srv.seed_staff(&admin, &lagos, &visa, "NIS-9").await;
    let staff_id: StaffId = staff["id"].as_str().unwrap().parse().unwrap();

    let token = mint_jwt(Role::StaffUser, Some(ScopeRef::Staff(staff_id)));
    let res = srv
        .post(
            &token,
            "/pending-edits",
            json!({ "staff_id": staff_id, "changes": { "rank": "SII" } }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let edit: Value = res.json().await.unwrap();
    assert_eq!(edit["status"], "pending");
    let edit_id = edit["id"].as_str().unwrap();

    let res = srv.get(&admin, "/pending-edits?status=pending").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let res = srv
        .post(&admin, &format!("/pending-edits/{edit_id}/approve"), json!({ "note": "ok" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["edit"]["status"], "approved");
    assert_eq!(body["staff"]["rank"], "SII");

    // Already resolved.
    let res = srv
        .post(&admin, &format!("/pending-edits/{edit_id}/reject"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // The submitter is told.
    let res = srv.get(&token, "/notifications?unread=true").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let res = srv.get(&admin, "/audit-logs").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn export_returns_attachment() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;
    srv.seed_staff(&admin, &lagos, &visa, "NIS-3").await;

    let res = srv
        .get(&admin, &format!("/export/xlsx?office_id={visa}&columns=nis_no,surname,rank"))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()["content-type"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert!(
        res.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .contains("staff_list.xlsx")
    );
    let bytes = res.bytes().await.unwrap();
    assert_eq!(&bytes[..2], b"PK");

    let res = srv.get(&admin, "/export/pdf").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    let bytes = res.bytes().await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn dashboard_counts_visible_staff() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;
    srv.seed_staff(&admin, &lagos, &visa, "NIS-4").await;
    srv.seed_staff(&admin, &lagos, &visa, "NIS-5").await;

    let res = srv.get(&admin, "/dashboard").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn states_and_lgas_are_listed() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();

    let res = srv.get(&admin, "/states").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let states = body["items"].as_array().unwrap();
    assert_eq!(states.len(), 37);
    let lagos = states.iter().find(|s| s["name"] == "Lagos").unwrap();

    let res = srv.get(&admin, &format!("/states/{}/lgas", lagos["id"])).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let lgas = body["items"].as_array().unwrap();
    assert_eq!(lgas.len(), 20);
    assert!(lgas.iter().any(|l| l["name"] == "Ikeja"));

    assert_eq!(srv.get(&admin, "/states/99/lgas").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(srv.get(&admin, "/states/lagos/lgas").await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn staff_with_unknown_origin_is_rejected() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;

    let res = srv
        .post(
            &admin,
            "/staff",
            json!({
                "nis_no": "NIS-9", "surname": "Bello", "other_names": "Amina", "rank": "II",
                "state_of_origin": "Lagos", "lga": "Kano Municipal",
                "formation_id": lagos, "office_id": visa,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn template_round_trips_through_import() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, _) = srv.seed_org(&admin, "LAG").await;

    let res = srv.get(&admin, "/import/template").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()["content-disposition"]
            .to_str()
            .unwrap()
            .contains("staff_import_template.xlsx")
    );
    let template = res.bytes().await.unwrap();

    let upload = |bytes: Vec<u8>| {
        srv.client
            .post(srv.url(&format!("/import/xlsx?formation_id={lagos}")))
            .bearer_auth(&admin)
            .body(bytes)
            .send()
    };

    // The sample row names an office the formation does not have yet.
    let res = upload(template.to_vec()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["created"], 0);
    assert_eq!(report["errors"][0]["row"], 2);

    let res = srv
        .post(&admin, "/offices", json!({ "formation_id": lagos, "name": "Visa Counter" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = upload(template.to_vec()).await.unwrap();
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["created"], 1);
    assert_eq!(report["errors"].as_array().unwrap().len(), 0);

    let res = srv.get(&admin, "/staff").await;
    let body: Value = res.json().await.unwrap();
    let staff = &body["items"][0];
    assert_eq!(staff["nis_no"], "12345");
    assert_eq!(staff["lga"], "Ikeja");

    let res = upload(b"not a workbook".to_vec()).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_changes_a_users_role() {
    let srv = TestServer::spawn().await;
    let admin = admin_token();
    let (lagos, visa) = srv.seed_org(&admin, "LAG").await;

    let res = srv
        .post(
            &admin,
            "/users",
            json!({
                "username": "visa.admin",
                "password": "correct horse",
                "role": "office_admin",
                "scope": { "kind": "office", "id": visa },
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let user: Value = res.json().await.unwrap();
    let path = format!("/users/{}/role", user["id"].as_str().unwrap());

    let res = srv
        .put(
            &admin,
            &path,
            json!({ "role": "formation_admin", "scope": { "kind": "formation", "id": lagos } }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["role"], "formation_admin");

    let res = srv.get(&admin, "/audit-logs?action=user_role_changed").await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let office_admin = mint_jwt(Role::OfficeAdmin, Some(ScopeRef::Office(visa.parse().unwrap())));
    let res = srv
        .put(
            &office_admin,
            &path,
            json!({ "role": "office_admin", "scope": { "kind": "office", "id": visa } }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv.put(&admin, &path, json!({ "role": "formation_admin" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
