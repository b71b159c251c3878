use super::*;
use async_trait::async_trait;
use axum::{body, body::Body, http::Request, response::Response};
use llm::{DayRequest, LlmError, MealGenerator};
use serde_json::{json, Value};
use shared::domain::{DayOfWeek, MealDraft, MealType};
use tower::ServiceExt;

struct FakeGenerator {
    fail: bool,
}

#[async_trait]
impl MealGenerator for FakeGenerator {
    async fn generate_day(&self, request: &DayRequest) -> Result<Vec<MealDraft>, LlmError> {
        if self.fail {
            return Err(LlmError::InvalidResponse("no meals in reply".into()));
        }
        Ok(MealType::ALL
            .into_iter()
            .map(|meal_type| MealDraft {
                day: request.day,
                meal_type,
                name: format!("{} {}", request.day, meal_type),
                description: String::new(),
                ingredients: vec!["quinoa".into()],
                calories: 500.0,
                protein_g: 31.25,
                carbs_g: 62.5,
                fat_g: 13.9,
                instructions: String::new(),
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "fake"
    }
}

async fn test_app_with(fail: bool) -> Router {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let api = ApiContext {
        storage,
        auth: AuthConfig {
            jwt_secret: "route-secret".into(),
            token_ttl_seconds: 600,
        },
        generator: Arc::new(FakeGenerator { fail }),
    };
    build_router(Arc::new(AppState::new(api)))
}

async fn test_app() -> Router {
    test_app_with(false).await
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn empty_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

async fn body_bytes(response: Response) -> Vec<u8> {
    body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json")
}

async fn register(app: &Router, email: &str) -> String {
    let request = json_request(
        "POST",
        "/api/auth/register",
        None,
        json!({
            "email": email,
            "password": "Passw0rdOk",
            "first_name": "Alice",
            "last_name": "Doe",
        }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["token"]
        .as_str()
        .expect("token")
        .to_string()
}

async fn generate(app: &Router, token: &str) -> i64 {
    let request = json_request(
        "POST",
        "/api/diet-plans/generate",
        Some(token),
        json!({ "name": "Route plan", "week_start": "2026-10-19" }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["diet_plan_id"]
        .as_i64()
        .expect("plan id")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app().await;
    let request = Request::get("/healthz").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn me_requires_a_valid_bearer_token() {
    let app = test_app().await;
    let token = register(&app, "me@example.com").await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/me", &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], "me@example.com");

    let anonymous = Request::get("/api/me").body(Body::empty()).expect("request");
    let response = app.clone().oneshot(anonymous).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "unauthorized");

    let response = app
        .oneshot(empty_request("GET", "/api/me", "not.a.token"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn bearer_token_parsing_is_scheme_insensitive() {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
    assert_eq!(extract::bearer_token(&headers), Some("abc"));
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
    assert_eq!(extract::bearer_token(&headers), None);
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
    assert_eq!(extract::bearer_token(&headers), None);
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict() {
    let app = test_app().await;
    register(&app, "dup@example.com").await;
    let request = json_request(
        "POST",
        "/api/auth/register",
        None,
        json!({
            "email": "DUP@example.com",
            "password": "Passw0rdOk",
            "first_name": "Bob",
            "last_name": "Roe",
        }),
    );
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "conflict");
}

#[tokio::test]
async fn malformed_json_returns_api_error() {
    let app = test_app().await;
    let request = Request::post("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from("{\"email\":"))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert!(response.status().is_client_error());
    assert_eq!(body_json(response).await["code"], "validation");
}

#[tokio::test]
async fn plan_routes_are_scoped_to_the_owner() {
    let app = test_app().await;
    let owner = register(&app, "owner@example.com").await;
    let other = register(&app, "other@example.com").await;
    let id = generate(&app, &owner).await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/diet-plans", &owner))
        .await
        .expect("response");
    let plans = body_json(response).await;
    assert_eq!(plans.as_array().map(Vec::len), Some(1));
    assert_eq!(plans[0]["meals"].as_array().map(Vec::len), Some(28));

    let uri = format!("/api/diet-plans/{id}");
    let response = app
        .clone()
        .oneshot(empty_request("GET", &uri, &other))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let rename = json_request("PATCH", &uri, Some(&owner), json!({ "name": "Renamed" }));
    let response = app.clone().oneshot(rename).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "Renamed");

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &uri, &owner))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app
        .oneshot(empty_request("GET", &uri, &owner))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exports_and_evaluation_routes() {
    let app = test_app().await;
    let token = register(&app, "export@example.com").await;
    let id = generate(&app, &token).await;

    let response = app
        .clone()
        .oneshot(empty_request("POST", &format!("/api/diet-plans/{id}/pdf"), &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let pdf = body_json(response).await;
    assert_eq!(pdf["filename"], "route-plan.pdf");
    let bytes = STANDARD
        .decode(pdf["pdf_b64"].as_str().expect("b64"))
        .expect("decode");
    assert!(bytes.starts_with(b"%PDF"));

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/diet-plans/{id}/csv"), &token))
        .await
        .expect("response");
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"route-plan.csv\""
    );
    let csv = String::from_utf8(body_bytes(response).await).expect("utf8");
    assert_eq!(csv.lines().count(), 29);

    let response = app
        .oneshot(empty_request(
            "GET",
            &format!("/api/diet-plans/{id}/evaluation"),
            &token,
        ))
        .await
        .expect("response");
    let report = body_json(response).await;
    assert_eq!(report["results"].as_array().map(Vec::len), Some(9));
}

#[tokio::test]
async fn stream_route_emits_sse_data_lines() {
    let app = test_app().await;
    let token = register(&app, "stream@example.com").await;
    let request = json_request(
        "POST",
        "/api/generate-diet-plan-stream",
        Some(&token),
        json!({ "week_start": "2026-10-19" }),
    );
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

    let text = String::from_utf8(body_bytes(response).await).expect("utf8");
    let events: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("event json"))
        .collect();
    assert_eq!(events.len(), 44);
    assert_eq!(events[0]["type"], "start");
    assert_eq!(events[1]["type"], "progress");
    assert_eq!(events[1]["day"], DayOfWeek::Monday.as_str());
    assert_eq!(events[43]["type"], "plan_complete");
    assert_eq!(events[43]["plan"]["meals"].as_array().map(Vec::len), Some(28));
}

#[tokio::test]
async fn model_failures_map_to_bad_gateway_or_error_event() {
    let app = test_app_with(true).await;
    let token = register(&app, "fail@example.com").await;

    let request = json_request("POST", "/api/diet-plans/generate", Some(&token), json!({}));
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "upstream");

    let request = json_request(
        "POST",
        "/api/generate-diet-plan-stream",
        Some(&token),
        json!({}),
    );
    let response = app.oneshot(request).await.expect("response");
    let text = String::from_utf8(body_bytes(response).await).expect("utf8");
    let last = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .last()
        .expect("an event");
    let last: Value = serde_json::from_str(last).expect("json");
    assert_eq!(last["type"], "error");
}

#[test]
fn error_codes_map_to_statuses() {
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorCode::Conflict), StatusCode::CONFLICT);
    assert_eq!(status_for(ErrorCode::Upstream), StatusCode::BAD_GATEWAY);
    assert_eq!(status_for(ErrorCode::Internal), StatusCode::INTERNAL_SERVER_ERROR);
}

async fn graphql(app: &Router, token: Option<&str>, query: &str, variables: Value) -> Value {
    let request = json_request(
        "POST",
        "/graphql",
        token,
        json!({ "query": query, "variables": variables }),
    );
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

const GQL_REGISTER: &str = r#"
    mutation Register($input: RegisterInput!) {
        register(input: $input) { token user { email firstName dailyCalorieTarget } }
    }
"#;

const GQL_LOGIN: &str = r#"
    mutation Login($email: String!, $password: String!) {
        login(email: $email, password: $password) { token user { id email } }
    }
"#;

#[tokio::test]
async fn graphql_login_mutation_returns_a_usable_token() {
    let app = test_app().await;
    let registered = graphql(
        &app,
        None,
        GQL_REGISTER,
        json!({ "input": {
            "email": "gql@example.com",
            "password": "Passw0rdOk",
            "firstName": "Grace",
            "lastName": "Hopper",
            "profile": { "goal": "weight_loss", "age": 40 },
        }}),
    )
    .await;
    assert!(registered.get("errors").is_none(), "{registered}");
    assert_eq!(registered["data"]["register"]["user"]["firstName"], "Grace");

    let logged_in = graphql(
        &app,
        None,
        GQL_LOGIN,
        json!({ "email": "gql@example.com", "password": "Passw0rdOk" }),
    )
    .await;
    assert!(logged_in.get("errors").is_none(), "{logged_in}");
    assert_eq!(logged_in["data"]["login"]["user"]["email"], "gql@example.com");
    let token = logged_in["data"]["login"]["token"]
        .as_str()
        .expect("token")
        .to_string();

    let me = graphql(&app, Some(&token), "{ me { email goal } }", json!({})).await;
    assert_eq!(me["data"]["me"]["email"], "gql@example.com");
    assert_eq!(me["data"]["me"]["goal"], "weight_loss");

    // REST and GraphQL accept the same tokens.
    let response = app
        .oneshot(empty_request("GET", "/api/me", &token))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn graphql_errors_carry_the_api_error_code() {
    let app = test_app().await;

    let bad_login = graphql(
        &app,
        None,
        GQL_LOGIN,
        json!({ "email": "nobody@example.com", "password": "Passw0rdOk" }),
    )
    .await;
    assert!(bad_login["data"].is_null(), "{bad_login}");
    assert_eq!(bad_login["errors"][0]["extensions"]["code"], "unauthorized");
    assert_eq!(bad_login["errors"][0]["message"], "invalid email or password");

    let anonymous = graphql(&app, None, "{ me { email } }", json!({})).await;
    assert_eq!(anonymous["errors"][0]["extensions"]["code"], "unauthorized");

    let weak = graphql(
        &app,
        None,
        GQL_REGISTER,
        json!({ "input": {
            "email": "weak@example.com",
            "password": "short",
            "firstName": "Weak",
            "lastName": "Password",
        }}),
    )
    .await;
    assert_eq!(weak["errors"][0]["extensions"]["code"], "validation");

    let token = register(&app, "owner@example.com").await;
    let missing = graphql(
        &app,
        Some(&token),
        "query Plan($id: Int!) { dietPlan(id: $id) { name } }",
        json!({ "id": 999 }),
    )
    .await;
    assert_eq!(missing["errors"][0]["extensions"]["code"], "not_found");

    let bad_goal = graphql(
        &app,
        Some(&token),
        "mutation { updateProfile(input: { goal: \"bulk_forever\" }) { goal } }",
        json!({}),
    )
    .await;
    assert_eq!(bad_goal["errors"][0]["extensions"]["code"], "validation");
}

#[tokio::test]
async fn graphql_plan_mutations_cover_generate_rename_pdf_and_delete() {
    let app = test_app().await;
    let token = register(&app, "planner@example.com").await;

    let generated = graphql(
        &app,
        Some(&token),
        r#"mutation Generate($input: GenerateDietPlanInput) {
            generateDietPlan(input: $input) { id name weekStart weekEnd meals { day mealType } }
        }"#,
        json!({ "input": { "name": "Graph week", "weekStart": "2026-10-21" } }),
    )
    .await;
    assert!(generated.get("errors").is_none(), "{generated}");
    let plan = &generated["data"]["generateDietPlan"];
    assert_eq!(plan["weekStart"], "2026-10-19");
    assert_eq!(plan["weekEnd"], "2026-10-25");
    assert_eq!(plan["meals"].as_array().expect("meals").len(), 28);
    let id = plan["id"].as_i64().expect("saved plan id");

    let listed = graphql(
        &app,
        Some(&token),
        "{ getAllDietPlans { id name } }",
        json!({}),
    )
    .await;
    assert_eq!(listed["data"]["getAllDietPlans"][0]["id"], id);

    let renamed = graphql(
        &app,
        Some(&token),
        "mutation Rename($id: Int!) { renameDietPlan(id: $id, name: \"Renamed\") { name } }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(renamed["data"]["renameDietPlan"]["name"], "Renamed");

    let pdf = graphql(
        &app,
        Some(&token),
        "mutation Pdf($id: Int!) { generatePDF(id: $id) { dietPlanId filename pdfB64 } }",
        json!({ "id": id }),
    )
    .await;
    let payload = &pdf["data"]["generatePDF"];
    assert_eq!(payload["dietPlanId"], id);
    assert!(payload["filename"].as_str().expect("filename").ends_with(".pdf"));
    let bytes = STANDARD
        .decode(payload["pdfB64"].as_str().expect("pdf"))
        .expect("base64");
    assert!(bytes.starts_with(b"%PDF"));

    let deleted = graphql(
        &app,
        Some(&token),
        "mutation Delete($id: Int!) { deleteDietPlan(id: $id) }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(deleted["data"]["deleteDietPlan"], true);

    let gone = graphql(
        &app,
        Some(&token),
        "query Plan($id: Int!) { dietPlan(id: $id) { name } }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(gone["errors"][0]["extensions"]["code"], "not_found");
}

#[tokio::test]
async fn graphiql_page_is_served_on_get() {
    let app = test_app().await;
    let request = Request::get("/graphql").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).expect("utf8");
    assert!(html.contains("graphiql"), "{html}");
}
