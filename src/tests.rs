//! Integration tests for the SACCO backend.

use std::sync::Arc;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::models::{NewMember, Role};
use crate::notify::{Mailer, RecordingMailer};
use crate::{create_router, AppState};

const API_KEY: &str = "test-api-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    repo: Arc<Repository>,
    mailer: Arc<RecordingMailer>,
    admin_id: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));
        let admin = repo
            .bootstrap_admin("admin@example.com")
            .await
            .expect("Failed to bootstrap admin")
            .expect("Admin already present");

        let mut config = Config {
            api_psk: Some(API_KEY.to_string()),
            db_path,
            log_level: "warn".to_string(),
            ..Config::default()
        };
        adjust(&mut config);

        let mailer = Arc::new(RecordingMailer::default());
        let shared_mailer: Arc<dyn Mailer> = mailer.clone();
        let state = AppState {
            repo: repo.clone(),
            config: Arc::new(config),
            mailer: shared_mailer,
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-api-key", API_KEY.parse().unwrap());
        let client = Client::builder().default_headers(headers).build().unwrap();

        TestFixture {
            client,
            base_url,
            repo,
            mailer,
            admin_id: admin.id,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        as_member: Option<&str>,
        body: Option<Value>,
    ) -> (u16, Value) {
        let mut request = self.client.request(method, self.url(path));
        if let Some(id) = as_member {
            request = request.header("x-member-id", id);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let resp = request.send().await.unwrap();
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap();
        (status, body)
    }

    async fn get(&self, path: &str, as_member: &str) -> (u16, Value) {
        self.call(Method::GET, path, Some(as_member), None).await
    }

    async fn post(&self, path: &str, as_member: &str, body: Value) -> (u16, Value) {
        self.call(Method::POST, path, Some(as_member), Some(body)).await
    }

    async fn put(&self, path: &str, as_member: &str, body: Value) -> (u16, Value) {
        self.call(Method::PUT, path, Some(as_member), Some(body)).await
    }

    async fn admin_get(&self, path: &str) -> (u16, Value) {
        self.get(path, &self.admin_id).await
    }

    async fn admin_post(&self, path: &str, body: Value) -> (u16, Value) {
        self.post(path, &self.admin_id, body).await
    }

    /// A plain member account created directly in the store.
    async fn member(&self, email: &str, name: &str) -> String {
        self.repo
            .create_member(
                &NewMember {
                    email: email.to_string(),
                    full_name: name.to_string(),
                    phone_number: None,
                    role: Role::Member,
                    share_capital_term: 12,
                },
                None,
            )
            .await
            .unwrap()
            .id
    }

    async fn share_capital(&self, member_id: &str, amount: &str) {
        let (status, body) = self
            .admin_post(
                "/api/share-capital",
                json!({ "memberId": member_id, "amount": amount }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
    }

    async fn contribution(&self, member_id: &str, year: i64, month: i64, amount: &str) -> (u16, Value) {
        self.admin_post(
            "/api/contributions",
            json!({ "memberId": member_id, "year": year, "month": month, "amount": amount }),
        )
        .await
    }

    /// Verified member with full share capital (5,000) and `contribution` of
    /// deposits on top.
    async fn eligible_member(&self, email: &str, contribution: &str) -> String {
        let id = self.member(email, email).await;
        let (status, _) = self
            .put(
                &format!("/api/members/{}/verification", id),
                &self.admin_id,
                json!({ "verified": true }),
            )
            .await;
        assert_eq!(status, 200);
        self.share_capital(&id, "5000").await;
        let (status, _) = self.contribution(&id, 2025, 1, contribution).await;
        assert_eq!(status, 200);
        id
    }

    /// Apply, approve at 0% and disburse. Returns the loan.
    async fn disbursed_loan(&self, member_id: &str, amount: &str, term: i64) -> Value {
        let (status, body) = self
            .post(
                "/api/loan-applications",
                member_id,
                json!({ "amount": amount, "purpose": "Working capital", "termMonths": term }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        let application_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = self
            .admin_post(
                &format!("/api/loan-applications/{}/approve", application_id),
                json!({ "interestRate": "0" }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        let loan_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = self
            .admin_post(&format!("/api/loans/{}/disburse", loan_id), json!({}))
            .await;
        assert_eq!(status, 200, "{}", body);
        body["data"].clone()
    }
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_auth_invalid_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = Client::new()
        .get(fixture.url("/api/revision"))
        .header("authorization", format!("Bearer {}", API_KEY))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_caller_identity_and_roles() {
    let fixture = TestFixture::new().await;
    let member = fixture.member("jane@example.com", "Jane").await;

    let (status, body) = fixture
        .call(Method::GET, "/api/members/me", None, None)
        .await;
    assert_eq!(status, 401);
    assert_eq!(error_code(&body), "UNAUTHORIZED");

    let (status, _) = fixture.get("/api/members/me", "no-such-member").await;
    assert_eq!(status, 401);

    let (status, body) = fixture.get("/api/members/me", &member).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["email"], "jane@example.com");
    assert_eq!(body["data"]["role"], "MEMBER");

    // Members cannot reach administrator endpoints or other members' records.
    let (status, body) = fixture.get("/api/members", &member).await;
    assert_eq!(status, 403);
    assert_eq!(error_code(&body), "FORBIDDEN");
    let (status, _) = fixture
        .get(&format!("/api/members/{}", fixture.admin_id), &member)
        .await;
    assert_eq!(status, 403);

    // Deactivated accounts are refused outright.
    let (status, _) = fixture
        .put(
            &format!("/api/members/{}/active", member),
            &fixture.admin_id,
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, 200);
    let (status, body) = fixture.get("/api/members/me", &member).await;
    assert_eq!(status, 403);
    assert_eq!(error_code(&body), "FORBIDDEN");

    // An administrator cannot deactivate themselves.
    let (status, _) = fixture
        .put(
            &format!("/api/members/{}/active", fixture.admin_id),
            &fixture.admin_id,
            json!({ "active": false }),
        )
        .await;
    assert_ne!(status, 200);
}

#[tokio::test]
async fn test_settings_update_bumps_revision() {
    let fixture = TestFixture::new().await;
    let member = fixture.member("jane@example.com", "Jane").await;

    let (status, body) = fixture.get("/api/settings", &member).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["shareValue"], "5000.00");
    let revision_before = body["revisionId"].as_i64().unwrap();

    let (status, _) = fixture
        .put("/api/settings", &member, json!({ "loanInterestRate": "12" }))
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .put(
            "/api/settings",
            &fixture.admin_id,
            json!({ "loanInterestRate": "12", "name": "Umoja SACCO" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["name"], "Umoja SACCO");
    assert!(body["revisionId"].as_i64().unwrap() > revision_before);

    let (status, body) = fixture
        .put(
            "/api/settings",
            &fixture.admin_id,
            json!({ "shareValue": "-1" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_invitation_accept_flow() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .admin_post(
            "/api/invitations",
            json!({ "email": "New.Member@Example.com", "shareCapitalTerm": 24 }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["email"], "new.member@example.com");
    assert!(body["data"].get("otp").is_none());

    let otp = fixture.mailer.otp_for("new.member@example.com").unwrap();

    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/invitations/accept",
            None,
            Some(json!({ "email": "new.member@example.com", "otp": "000000x", "fullName": "New Member" })),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let (status, body) = fixture
        .call(
            Method::POST,
            "/api/invitations/accept",
            None,
            Some(json!({ "email": "new.member@example.com", "otp": otp, "fullName": "New Member" })),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["role"], "MEMBER");
    assert_eq!(body["data"]["shareCapitalTerm"], 24);
    let member_id = body["data"]["id"].as_str().unwrap().to_string();

    // The code is single-use.
    let (status, _) = fixture
        .call(
            Method::POST,
            "/api/invitations/accept",
            None,
            Some(json!({ "email": "new.member@example.com", "otp": otp, "fullName": "Again" })),
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture.get("/api/members/me", &member_id).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["fullName"], "New Member");

    // Existing members cannot be invited again.
    let (status, _) = fixture
        .admin_post("/api/invitations", json!({ "email": "new.member@example.com" }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_invitation_rolls_back_when_email_fails() {
    let fixture = TestFixture::new().await;
    fixture.mailer.fail_for("bounce@example.com");

    let (status, body) = fixture
        .admin_post("/api/invitations", json!({ "email": "bounce@example.com" }))
        .await;
    assert_eq!(status, 502);
    assert_eq!(error_code(&body), "EMAIL_ERROR");

    let (_, body) = fixture.admin_get("/api/invitations").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    fixture.mailer.clear_failures();
    let (status, body) = fixture
        .admin_post("/api/invitations", json!({ "email": "bounce@example.com" }))
        .await;
    assert_eq!(status, 200);
    let invitation_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = fixture
        .admin_post(&format!("/api/invitations/{}/resend", invitation_id), json!({}))
        .await;
    assert_eq!(status, 200, "{}", body);
    let invitations = fixture
        .mailer
        .sent()
        .into_iter()
        .filter(|e| e.to == "bounce@example.com")
        .count();
    assert_eq!(invitations, 2);
    assert!(fixture.mailer.otp_for("bounce@example.com").is_some());
}

#[tokio::test]
async fn test_contributions_and_share_summary() {
    let fixture = TestFixture::new().await;
    let alice = fixture.member("alice@example.com", "Alice").await;
    let bob = fixture.member("bob@example.com", "Bob").await;

    fixture.share_capital(&alice, "2500").await;
    let (status, body) = fixture.contribution(&alice, 2025, 3, "1000").await;
    assert_eq!(status, 200, "{}", body);

    // One contribution per member and month.
    let (status, body) = fixture.contribution(&alice, 2025, 3, "500").await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let (status, _) = fixture.contribution(&alice, 2025, 13, "500").await;
    assert_eq!(status, 400);
    let (status, _) = fixture.contribution(&fixture.admin_id, 2025, 3, "500").await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .get(&format!("/api/members/{}/summary", alice), &alice)
        .await;
    assert_eq!(status, 200);
    let summary = &body["data"];
    assert_eq!(summary["totalShareCapital"], "2500.00");
    assert_eq!(summary["shareCapitalCompletionPercentage"], "50.00");
    assert_eq!(summary["totalContributions"], "1000.00");
    assert_eq!(summary["totalDeposits"], "3500.00");
    assert_eq!(summary["percentageOfTotalPool"], "100.00");

    // Bob brings the same deposits, so each holds half the pool.
    fixture.share_capital(&bob, "2500").await;
    let (status, _) = fixture.contribution(&bob, 2025, 3, "1000").await;
    assert_eq!(status, 200);
    let (_, body) = fixture
        .get(&format!("/api/members/{}/summary", alice), &alice)
        .await;
    assert_eq!(body["data"]["percentageOfTotalPool"], "50.00");

    // Summaries survive a full recalculation unchanged.
    let (status, _) = fixture
        .admin_post("/api/summaries/recalculate", json!({}))
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture
        .get(&format!("/api/members/{}/summary", bob), &bob)
        .await;
    assert_eq!(body["data"]["totalDeposits"], "3500.00");
    assert_eq!(body["data"]["percentageOfTotalPool"], "50.00");

    let (status, body) = fixture
        .get(&format!("/api/members/{}/contributions?year=2025", alice), &alice)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = fixture
        .admin_get("/api/reports/incomplete-share-capital")
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["remainingAmount"], "2500.00");
}

#[tokio::test]
async fn test_bulk_contributions_are_all_or_nothing() {
    let fixture = TestFixture::new().await;
    let alice = fixture.member("alice@example.com", "Alice").await;
    let bob = fixture.member("bob@example.com", "Bob").await;

    let (status, _) = fixture
        .admin_post(
            "/api/contributions/bulk",
            json!({ "contributions": [
                { "memberId": alice, "year": 2025, "month": 4, "amount": "1000" },
                { "memberId": bob, "year": 2025, "month": 4, "amount": "1000" },
                { "memberId": alice, "year": 2025, "month": 4, "amount": "1000" }
            ]}),
        )
        .await;
    assert_eq!(status, 400);

    let (_, body) = fixture
        .admin_get("/api/reports/missing-contributions?year=2025&month=4")
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = fixture
        .admin_post(
            "/api/contributions/bulk",
            json!({ "contributions": [
                { "memberId": alice, "year": 2025, "month": 4, "amount": "1000" },
                { "memberId": bob, "year": 2025, "month": 4, "amount": "1000" }
            ]}),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = fixture
        .admin_get("/api/reports/missing-contributions?year=2025&month=4")
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_contributions_allowed_when_configured() {
    let fixture = TestFixture::with_config(|c| c.unique_monthly_contributions = false).await;
    let alice = fixture.member("alice@example.com", "Alice").await;

    let (status, _) = fixture.contribution(&alice, 2025, 5, "1000").await;
    assert_eq!(status, 200);
    let (status, _) = fixture.contribution(&alice, 2025, 5, "500").await;
    assert_eq!(status, 200);

    let (_, body) = fixture
        .get(&format!("/api/members/{}/summary", alice), &alice)
        .await;
    assert_eq!(body["data"]["totalContributions"], "1500.00");
}

#[tokio::test]
async fn test_loan_eligibility_reasons() {
    let fixture = TestFixture::new().await;
    let alice = fixture.member("alice@example.com", "Alice").await;

    let (status, body) = fixture
        .get(&format!("/api/members/{}/eligibility", alice), &alice)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["eligible"], false);
    assert_eq!(body["data"]["maxLoanAmount"], "0.00");
    // Unverified is checked after share capital, so it is the reason reported.
    assert!(body["data"]["reason"]
        .as_str()
        .unwrap()
        .contains("verified"));

    let (status, body) = fixture
        .post(
            "/api/loan-applications",
            &alice,
            json!({ "amount": "1000", "purpose": "School fees", "termMonths": 6 }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let (_, body) = fixture
        .get(&format!("/api/members/{}/eligibility", bob), &bob)
        .await;
    assert_eq!(body["data"]["eligible"], true);
    // (5,000 + 1,000) x 3
    assert_eq!(body["data"]["maxLoanAmount"], "18000.00");

    let (status, _) = fixture
        .post(
            "/api/loan-applications",
            &bob,
            json!({ "amount": "18000.01", "purpose": "Land", "termMonths": 12 }),
        )
        .await;
    assert_eq!(status, 400);

    // Placing the account on hold overrides everything else.
    let (status, _) = fixture
        .put(
            &format!("/api/members/{}/hold", bob),
            &fixture.admin_id,
            json!({ "onHold": true, "reason": "arrears" }),
        )
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture
        .get(&format!("/api/members/{}/eligibility", bob), &bob)
        .await;
    assert_eq!(body["data"]["eligible"], false);
    assert!(body["data"]["reason"].as_str().unwrap().contains("arrears"));
}

#[tokio::test]
async fn test_loan_lifecycle_to_settlement() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;

    let loan = fixture.disbursed_loan(&bob, "6000", 3).await;
    let loan_id = loan["id"].as_str().unwrap().to_string();
    assert_eq!(loan["status"], "DISBURSED");
    assert_eq!(loan["processingFee"], "60.00");
    assert_eq!(loan["insuranceFee"], "60.00");
    assert_eq!(loan["disbursedAmount"], "5880.00");
    assert_eq!(loan["totalExpectedRepayment"], "6000.00");
    assert_eq!(loan["remainingBalance"], "6000.00");
    assert!(fixture.mailer.sent().iter().any(|e| e.to == "bob@example.com"
        && e.subject == "Your loan has been disbursed"));

    let (status, body) = fixture
        .get(&format!("/api/loans/{}/schedule", loan_id), &bob)
        .await;
    assert_eq!(status, 200);
    let schedule = body["data"].as_array().unwrap();
    assert_eq!(schedule.len(), 3);
    assert!(schedule.iter().all(|e| e["amountDue"] == "2000.00"));

    let (status, body) = fixture
        .admin_post(
            &format!("/api/loans/{}/repayments", loan_id),
            json!({ "amount": "2500" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["settled"], false);
    assert_eq!(body["data"]["loan"]["remainingBalance"], "3500.00");
    assert_eq!(body["data"]["allocations"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"]["allocations"][0]["status"], "PAID");
    assert_eq!(body["data"]["allocations"][1]["status"], "PARTIAL");

    // More than the outstanding balance is refused.
    let (status, body) = fixture
        .admin_post(
            &format!("/api/loans/{}/repayments", loan_id),
            json!({ "amount": "3500.01" }),
        )
        .await;
    assert_eq!(status, 422);
    assert_eq!(error_code(&body), "OVERPAYMENT");
    assert_eq!(body["error"]["details"]["outstanding"], "3500.00");

    let (status, body) = fixture
        .admin_post(
            &format!("/api/loans/{}/repayments", loan_id),
            json!({ "amount": "3500" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["settled"], true);
    assert_eq!(body["data"]["loan"]["status"], "SETTLED");
    assert_eq!(body["data"]["loan"]["remainingBalance"], "0.00");
    assert!(fixture
        .mailer
        .last_to("bob@example.com")
        .is_some_and(|e| e.subject.contains("fully repaid")));

    let (_, body) = fixture
        .get(&format!("/api/loans/{}/statement", loan_id), &bob)
        .await;
    assert_eq!(body["data"]["totalRepaid"], "6000.00");
    assert_eq!(body["data"]["repayments"].as_array().unwrap().len(), 2);
    assert!(body["data"]["schedule"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["status"] == "PAID"));

    // No further payments on a settled loan.
    let (status, body) = fixture
        .admin_post(
            &format!("/api/loans/{}/repayments", loan_id),
            json!({ "amount": "1" }),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_code(&body), "INVALID_STATE");

    let (_, body) = fixture
        .get(&format!("/api/transactions?memberId={}", bob), &bob)
        .await;
    let types: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["transactionType"].as_str())
        .collect();
    assert!(types.contains(&"LOAN_DISBURSEMENT"));
    assert_eq!(types.iter().filter(|t| **t == "LOAN_REPAYMENT").count(), 2);
}

#[tokio::test]
async fn test_application_review_rules() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let carol = fixture.member("carol@example.com", "Carol").await;

    let (_, body) = fixture
        .post(
            "/api/loan-applications",
            &bob,
            json!({ "amount": "3000", "purpose": "Stock", "termMonths": 6 }),
        )
        .await;
    let application_id = body["data"]["id"].as_str().unwrap().to_string();

    // Only administrators review; only the applicant sees or cancels.
    let (status, _) = fixture
        .post(
            &format!("/api/loan-applications/{}/approve", application_id),
            &bob,
            json!({}),
        )
        .await;
    assert_eq!(status, 403);
    let (status, _) = fixture
        .get(&format!("/api/loan-applications/{}", application_id), &carol)
        .await;
    assert_eq!(status, 403);
    let (status, _) = fixture
        .post(
            &format!("/api/loan-applications/{}/cancel", application_id),
            &carol,
            json!({}),
        )
        .await;
    assert_eq!(status, 403);

    let (status, body) = fixture
        .admin_post(
            &format!("/api/loan-applications/{}/reject", application_id),
            json!({ "reason": "Incomplete paperwork" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["status"], "REJECTED");
    assert!(fixture
        .mailer
        .last_to("bob@example.com")
        .is_some_and(|e| e.body.contains("Incomplete paperwork")));

    // A rejected application cannot be approved afterwards.
    let (status, body) = fixture
        .admin_post(
            &format!("/api/loan-applications/{}/approve", application_id),
            json!({}),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(error_code(&body), "INVALID_STATE");

    let (status, body) = fixture.get("/api/loans?status=BOGUS", &bob).await;
    assert_eq!(status, 400, "{}", body);
}

#[tokio::test]
async fn test_stale_version_repayment_conflicts() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let loan = fixture.disbursed_loan(&bob, "6000", 3).await;
    let loan_id = loan["id"].as_str().unwrap().to_string();
    let version = loan["version"].as_i64().unwrap();

    let path = format!("/api/loans/{}/repayments", loan_id);
    let body = json!({ "amount": "1000", "expectedVersion": version });
    let (first, second) = tokio::join!(
        fixture.admin_post(&path, body.clone()),
        fixture.admin_post(&path, body.clone()),
    );

    let statuses = [first.0, second.0];
    assert!(statuses.contains(&200), "{:?}", statuses);
    assert!(statuses.contains(&409), "{:?}", statuses);
    let conflict = if first.0 == 409 { &first.1 } else { &second.1 };
    assert_eq!(error_code(conflict), "VERSION_MISMATCH");
    assert_eq!(conflict["error"]["details"]["currentVersion"], version + 1);

    let (_, body) = fixture.get(&format!("/api/loans/{}", loan_id), &bob).await;
    assert_eq!(body["data"]["remainingBalance"], "5000.00");
}

#[tokio::test]
async fn test_guarantor_requests() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let carol = fixture.eligible_member("carol@example.com", "2000").await;

    let (_, body) = fixture
        .post(
            "/api/loan-applications",
            &bob,
            json!({ "amount": "6000", "purpose": "Stock", "termMonths": 3 }),
        )
        .await;
    let application_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = fixture
        .post(
            "/api/guarantor-requests",
            &bob,
            json!({ "applicationId": application_id, "guarantorId": bob, "guaranteeAmount": "500" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .post(
            "/api/guarantor-requests",
            &bob,
            json!({ "applicationId": application_id, "guarantorId": carol, "guaranteeAmount": "1500" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = fixture
        .post(
            "/api/guarantor-requests",
            &bob,
            json!({ "applicationId": application_id, "guarantorId": carol, "guaranteeAmount": "100" }),
        )
        .await;
    assert_eq!(status, 400);

    // Only the named guarantor answers.
    let (status, _) = fixture
        .post(
            &format!("/api/guarantor-requests/{}/respond", request_id),
            &bob,
            json!({ "accept": true }),
        )
        .await;
    assert_eq!(status, 403);
    let (status, body) = fixture
        .post(
            &format!("/api/guarantor-requests/{}/respond", request_id),
            &carol,
            json!({ "accept": true, "responseMessage": "Happy to help" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["status"], "ACCEPTED");

    // Nothing is committed until the loan is approved.
    let (_, body) = fixture
        .get(&format!("/api/members/{}/guarantor-limit", carol), &carol)
        .await;
    assert_eq!(body["data"]["maximumGuaranteeAmount"], "2000.00");
    assert_eq!(body["data"]["availableGuaranteeAmount"], "2000.00");

    let (status, _) = fixture
        .admin_post(
            &format!("/api/loan-applications/{}/approve", application_id),
            json!({}),
        )
        .await;
    assert_eq!(status, 200);
    let (_, body) = fixture
        .get(&format!("/api/members/{}/guarantor-limit", carol), &carol)
        .await;
    assert_eq!(body["data"]["totalGuaranteed"], "1500.00");
    assert_eq!(body["data"]["activeGuarantees"], 1);
    assert_eq!(body["data"]["availableGuaranteeAmount"], "500.00");

    let (_, body) = fixture.get("/api/guarantor-requests", &carol).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dividend_declaration() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let carol = fixture.eligible_member("carol@example.com", "3000").await;

    let (status, body) = fixture
        .admin_post(
            "/api/dividends",
            json!({ "totalAmount": "1000", "source": "2025 surplus" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    let detail = &body["data"];
    assert_eq!(detail["distribution"]["recipients"], 2);
    assert_eq!(detail["distribution"]["calculationMethod"], "BOTH");

    let allocations = detail["allocations"].as_array().unwrap();
    assert_eq!(allocations.len(), 2);
    let total: rust_decimal::Decimal = allocations
        .iter()
        .map(|a| a["amount"].as_str().unwrap().parse::<rust_decimal::Decimal>().unwrap())
        .sum();
    assert_eq!(total.to_string(), "1000.00");

    let bob_share = allocations
        .iter()
        .find(|a| a["memberId"] == bob.as_str())
        .unwrap()["amount"]
        .clone();
    let (_, body) = fixture
        .get(&format!("/api/members/{}/summary", bob), &bob)
        .await;
    assert_eq!(body["data"]["totalDividendsReceived"], bob_share);
    assert_eq!(body["data"]["lastDividendAmount"], bob_share);

    let (_, body) = fixture
        .get(&format!("/api/members/{}/dividends", carol), &carol)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (status, _) = fixture
        .get(&format!("/api/members/{}/dividends", carol), &bob)
        .await;
    assert_eq!(status, 403);

    let (status, _) = fixture
        .admin_post("/api/dividends", json!({ "totalAmount": "0", "source": "none" }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_financial_summary() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    fixture.disbursed_loan(&bob, "6000", 3).await;

    let (status, body) = fixture.admin_get("/api/reports/financial-summary").await;
    assert_eq!(status, 200, "{}", body);
    let summary = &body["data"];
    assert_eq!(summary["totalShareCapital"], "5000.00");
    assert_eq!(summary["totalContributions"], "1000.00");
    assert_eq!(summary["outstandingLoans"], "6000.00");
    assert_eq!(summary["feesIncome"], "120.00");
    assert_eq!(summary["interestIncome"], "0.00");
    assert_eq!(summary["totalMembers"], 1);
    assert_eq!(summary["activeMembers"], 1);

    let (status, _) = fixture.get("/api/reports/financial-summary", &bob).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_notification_batches_count_failures() {
    let fixture = TestFixture::new().await;
    fixture.member("alice@example.com", "Alice").await;
    fixture.member("bob@example.com", "Bob").await;
    fixture.mailer.fail_for("bob@example.com");

    let (status, body) = fixture
        .admin_post(
            "/api/notifications/mass-email",
            json!({ "subject": "AGM", "message": "The AGM is on Saturday." }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["sentCount"], 1);
    assert_eq!(body["data"]["failedCount"], 1);

    let (status, body) = fixture
        .admin_post(
            "/api/notifications/contribution-reminders",
            json!({ "year": 2025, "month": 6 }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["sentCount"], 1);
    assert_eq!(body["data"]["failedCount"], 1);

    let (status, _) = fixture
        .admin_post(
            "/api/notifications/payment-reminders",
            json!({ "scope": "sometimes" }),
        )
        .await;
    assert_eq!(status, 400);

    let (_, body) = fixture.admin_get("/api/activity?action=MASS_EMAIL").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_router_answers_without_network() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("test.sqlite"))
        .await
        .unwrap();
    let state = AppState {
        repo: Arc::new(Repository::new(pool)),
        config: Arc::new(Config::default()),
        mailer: Arc::new(RecordingMailer::default()),
    };

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri("/api/revision")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_sub_cent_amounts_rejected() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let carol = fixture.eligible_member("carol@example.com", "1000").await;

    let (status, body) = fixture
        .admin_post(
            "/api/share-capital",
            json!({ "memberId": bob, "amount": "0.004" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let (status, _) = fixture.contribution(&bob, 2025, 2, "0.001").await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .post(
            "/api/loan-applications",
            &bob,
            json!({ "amount": "0.004", "purpose": "Stock", "termMonths": 3 }),
        )
        .await;
    assert_eq!(status, 400);
    let (_, body) = fixture.get("/api/loan-applications", &bob).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (_, body) = fixture
        .post(
            "/api/loan-applications",
            &bob,
            json!({ "amount": "3000", "purpose": "Stock", "termMonths": 3 }),
        )
        .await;
    let application_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = fixture
        .post(
            "/api/guarantor-requests",
            &bob,
            json!({ "applicationId": application_id, "guarantorId": carol, "guaranteeAmount": "0.004" }),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = fixture
        .admin_post("/api/dividends", json!({ "totalAmount": "0.004", "source": "rounding" }))
        .await;
    assert_eq!(status, 400);

    // Half a cent rounds up to a real cent and is accepted.
    let (status, body) = fixture
        .admin_post(
            "/api/share-capital",
            json!({ "memberId": bob, "amount": "0.005" }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["amount"], "0.01");
}

#[tokio::test]
async fn test_guarantor_cannot_promise_savings_twice() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let dave = fixture.eligible_member("dave@example.com", "1000").await;
    let carol = fixture.eligible_member("carol@example.com", "2000").await;

    let mut requests = Vec::new();
    for (applicant, amount) in [(&bob, "1500"), (&dave, "1000")] {
        let (_, body) = fixture
            .post(
                "/api/loan-applications",
                applicant,
                json!({ "amount": "4000", "purpose": "Stock", "termMonths": 3 }),
            )
            .await;
        let application_id = body["data"]["id"].as_str().unwrap().to_string();
        let (status, body) = fixture
            .post(
                "/api/guarantor-requests",
                applicant,
                json!({ "applicationId": application_id, "guarantorId": carol, "guaranteeAmount": amount }),
            )
            .await;
        assert_eq!(status, 200, "{}", body);
        requests.push(body["data"]["id"].as_str().unwrap().to_string());
    }

    let (status, _) = fixture
        .post(
            &format!("/api/guarantor-requests/{}/respond", requests[0]),
            &carol,
            json!({ "accept": true }),
        )
        .await;
    assert_eq!(status, 200);

    // 1500 of carol's 2000 is already promised to bob's pending application.
    let (status, body) = fixture
        .post(
            &format!("/api/guarantor-requests/{}/respond", requests[1]),
            &carol,
            json!({ "accept": true }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    // The reported limit still only counts approved or disbursed loans.
    let (_, body) = fixture
        .get(&format!("/api/members/{}/guarantor-limit", carol), &carol)
        .await;
    assert_eq!(body["data"]["availableGuaranteeAmount"], "2000.00");

    let (status, body) = fixture
        .post(
            &format!("/api/guarantor-requests/{}/respond", requests[1]),
            &carol,
            json!({ "accept": false }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["status"], "REJECTED");
}

#[tokio::test]
async fn test_bulk_share_capital_is_all_or_nothing() {
    let fixture = TestFixture::new().await;
    let alice = fixture.member("alice@example.com", "Alice").await;
    let bob = fixture.member("bob@example.com", "Bob").await;

    let (status, body) = fixture
        .admin_post(
            "/api/share-capital/bulk",
            json!({ "payments": [
                { "memberId": alice, "amount": "2500" },
                { "memberId": bob, "amount": "1000" },
                { "memberId": fixture.admin_id, "amount": "1000" }
            ]}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");

    let (status, _) = fixture
        .admin_post(
            "/api/share-capital/bulk",
            json!({ "payments": [
                { "memberId": alice, "amount": "2500" },
                { "memberId": bob, "amount": "0.001" }
            ]}),
        )
        .await;
    assert_eq!(status, 400);

    let (_, body) = fixture
        .get(&format!("/api/members/{}/share-capital", alice), &alice)
        .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = fixture
        .admin_post("/api/share-capital/bulk", json!({ "payments": [] }))
        .await;
    assert_eq!(status, 400);

    let (status, body) = fixture
        .admin_post(
            "/api/share-capital/bulk",
            json!({ "payments": [
                { "memberId": alice, "amount": "2500", "referenceNumber": "BNK-001" },
                { "memberId": bob, "amount": "1000" }
            ]}),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = fixture
        .get(&format!("/api/members/{}/summary", alice), &alice)
        .await;
    assert_eq!(body["data"]["totalShareCapital"], "2500.00");
    assert_eq!(body["data"]["percentageOfTotalPool"], "71.43");

    let (status, _) = fixture
        .post(
            "/api/share-capital/bulk",
            &alice,
            json!({ "payments": [{ "memberId": alice, "amount": "10" }] }),
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_member_dashboard() {
    use chrono::Datelike;

    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    let carol = fixture.member("carol@example.com", "Carol").await;
    let loan = fixture.disbursed_loan(&bob, "6000", 3).await;

    let today = chrono::Utc::now().date_naive();
    let (year, month) = (i64::from(today.year()), i64::from(today.month()));
    let (status, _) = fixture.contribution(&bob, year, month, "500").await;
    assert_eq!(status, 200);

    let (status, _) = fixture
        .post(
            &format!("/api/members/{}/documents", bob),
            &bob,
            json!({ "documentType": "ID_FRONT", "storageRef": "kyc/bob-front.jpg" }),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = fixture
        .get(&format!("/api/members/{}/dashboard", bob), &bob)
        .await;
    assert_eq!(status, 200, "{}", body);
    let dashboard = &body["data"];
    assert_eq!(dashboard["profile"]["id"], bob);
    assert_eq!(dashboard["documents"]["idFront"]["uploaded"], true);
    assert_eq!(dashboard["documents"]["idFront"]["verified"], false);
    assert_eq!(dashboard["documents"]["passport"]["uploaded"], false);
    assert_eq!(dashboard["shareSummary"]["totalContributions"], "1500.00");
    assert_eq!(dashboard["recentContributions"].as_array().unwrap().len(), 2);
    assert_eq!(dashboard["recentShareCapital"].as_array().unwrap().len(), 1);
    assert_eq!(dashboard["activeLoans"].as_array().unwrap().len(), 1);
    assert_eq!(dashboard["activeLoans"][0]["id"], loan["id"]);
    assert!(dashboard.get("latestDividend").is_none());

    let next = &dashboard["nextContributionDue"];
    assert_eq!(next["isCurrentMonthPaid"], true);
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    assert_eq!(next["year"], next_year);
    assert_eq!(next["month"], next_month);

    let (status, body) = fixture
        .get(&format!("/api/members/{}/financial-summary", bob), &bob)
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["monthlyContributions"], "1500.00");
    assert_eq!(body["data"]["shareCapital"], "5000.00");
    assert_eq!(body["data"]["totalInvestments"], "6500.00");

    // Members see only their own; administrators have no dashboard.
    let (status, _) = fixture
        .get(&format!("/api/members/{}/dashboard", bob), &carol)
        .await;
    assert_eq!(status, 403);
    let (status, _) = fixture
        .admin_get(&format!("/api/members/{}/dashboard", fixture.admin_id))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_society_books_feed_financial_summary() {
    let fixture = TestFixture::new().await;
    let bob = fixture.eligible_member("bob@example.com", "1000").await;
    fixture.disbursed_loan(&bob, "6000", 3).await;

    let (status, body) = fixture
        .admin_post(
            "/api/income",
            json!({
                "incomeDate": "2025-03-10",
                "amount": "500",
                "description": "Entrance fees",
                "category": "MEMBERSHIP",
                "paymentMethod": "M-Pesa"
            }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["amount"], "500.00");

    let (status, body) = fixture
        .admin_post(
            "/api/expenses",
            json!({
                "expenseDate": "2025-03-01",
                "amount": "200",
                "description": "Account maintenance",
                "category": "BANKING",
                "paymentMethod": "Bank debit",
                "transactionCost": "5"
            }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["transactionCost"], "5.00");

    let (status, _) = fixture
        .admin_post(
            "/api/expenses",
            json!({
                "amount": "0.001",
                "description": "Nothing",
                "category": "OTHER",
                "paymentMethod": "Cash"
            }),
        )
        .await;
    assert_eq!(status, 400);

    let (_, body) = fixture.admin_get("/api/expenses?category=BANKING").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    let (_, body) = fixture.admin_get("/api/expenses?dateFrom=2025-04-01").await;
    assert!(body["data"].as_array().unwrap().is_empty());
    let (status, _) = fixture.admin_get("/api/expenses?category=TRAVEL").await;
    assert_eq!(status, 400);
    let (_, body) = fixture
        .admin_get("/api/income?dateFrom=2025-03-01&dateTo=2025-03-31")
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = fixture.get("/api/expenses", &bob).await;
    assert_eq!(status, 403);

    let (_, body) = fixture.admin_get("/api/reports/financial-summary").await;
    let summary = &body["data"];
    assert_eq!(summary["otherIncome"], "500.00");
    assert_eq!(summary["operatingExpenses"], "205.00");
    assert_eq!(summary["totalIncome"], "620.00");
    assert_eq!(summary["totalExpenses"], "205.00");
    assert_eq!(summary["netIncome"], "415.00");
    assert_eq!(summary["cashAtHand"], "295.00");

    let (_, body) = fixture.admin_get("/api/activity?action=EXPENSE_RECORDED").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}
