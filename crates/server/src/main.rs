use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use diet_api::{ApiContext, AuthConfig};
use llm::{OpenAiCompatibleBackend, OpenAiConfig};
use shared::{
    domain::{DietPlan, DietPlanId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        AuthResponse, ChangePasswordRequest, GenerateDietPlanRequest, LoginRequest, PdfResponse,
        ProfileUpdate, RegisterRequest, RenameDietPlanRequest,
    },
};
use storage::Storage;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod extract;
mod graphql;
mod sse;

use app_state::AppState;
use config::{load_settings, prepare_database_url, Settings};
use extract::{bearer_token, AuthUser, JsonBody};

pub(crate) type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    if settings.uses_default_secret() {
        warn!("JWT secret is the development default; set APP__JWT_SECRET in production");
    }
    if settings.llm_api_key.is_none() {
        warn!(base_url = %settings.llm_base_url, "no LLM API key configured");
    }

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let addr: SocketAddr = settings.server_bind.parse()?;
    let app = build_router(Arc::new(AppState::new(api_context(storage, &settings))))
    .layer(cors_layer(&settings))
    .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
    .layer(TraceLayer::new_for_http());

    info!(%addr, model = %settings.llm_model, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn api_context(storage: Storage, settings: &Settings) -> ApiContext {
    let generator = OpenAiCompatibleBackend::new(OpenAiConfig {
        base_url: settings.llm_base_url.clone(),
        api_key: settings.llm_api_key.clone(),
        model: settings.llm_model.clone(),
        temperature: settings.llm_temperature,
        max_tokens: settings.llm_max_tokens,
    });
    ApiContext {
        storage,
        auth: AuthConfig {
            jwt_secret: settings.jwt_secret.clone(),
            token_ttl_seconds: settings.token_ttl_seconds,
        },
        generator: Arc::new(generator),
    }
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origin = settings
        .cors_origin
        .as_deref()
        .and_then(|origin| HeaderValue::from_str(origin).ok());
    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auth/register", post(http_register))
        .route("/api/auth/login", post(http_login))
        .route(
            "/api/me",
            get(http_current_user)
                .put(http_update_profile)
                .delete(http_delete_account),
        )
        .route("/api/me/password", post(http_change_password))
        .route("/api/diet-plans", get(http_list_diet_plans))
        .route("/api/diet-plans/generate", post(http_generate_diet_plan))
        .route(
            "/api/diet-plans/:id",
            get(http_get_diet_plan)
                .patch(http_rename_diet_plan)
                .delete(http_delete_diet_plan),
        )
        .route(
            "/api/diet-plans/:id/pdf",
            post(http_generate_pdf).get(http_download_pdf),
        )
        .route("/api/diet-plans/:id/csv", get(http_export_csv))
        .route("/api/diet-plans/:id/evaluation", get(http_evaluate_diet_plan))
        .route("/api/generate-diet-plan-stream", post(http_stream_diet_plan))
        .route("/graphql", get(graphiql).post(http_graphql))
        .with_state(state)
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn http_error(err: ApiError) -> HttpError {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "request failed");
    }
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn http_graphql(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<async_graphql::Request>,
) -> Json<async_graphql::Response> {
    let viewer = graphql::Viewer(bearer_token(&headers).map(str::to_string));
    Json(state.schema.execute(request.data(viewer)).await)
}

async fn graphiql() -> Html<String> {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

async fn http_register(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), HttpError> {
    let response = diet_api::register(&state.api, req)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, HttpError> {
    diet_api::login(&state.api, req)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_current_user(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserProfile>, HttpError> {
    diet_api::current_user(&state.api, user_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<Json<UserProfile>, HttpError> {
    diet_api::update_profile(&state.api, user_id, update)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_account(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, HttpError> {
    diet_api::delete_account(&state.api, user_id)
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> Result<StatusCode, HttpError> {
    diet_api::change_password(&state.api, user_id, req)
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_generate_diet_plan(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    JsonBody(req): JsonBody<GenerateDietPlanRequest>,
) -> Result<Json<DietPlan>, HttpError> {
    diet_api::generate_diet_plan(&state.api, user_id, req)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_stream_diet_plan(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    JsonBody(req): JsonBody<GenerateDietPlanRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let rx = diet_api::stream_diet_plan(&state.api, user_id, req)
        .await
        .map_err(http_error)?;
    Ok(sse::event_stream(rx))
}

async fn http_list_diet_plans(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<DietPlan>>, HttpError> {
    diet_api::get_all_diet_plans(&state.api, user_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_get_diet_plan(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DietPlan>, HttpError> {
    diet_api::get_diet_plan(&state.api, user_id, DietPlanId(id))
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_rename_diet_plan(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<RenameDietPlanRequest>,
) -> Result<Json<DietPlan>, HttpError> {
    diet_api::rename_diet_plan(&state.api, user_id, DietPlanId(id), &req.name)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn http_delete_diet_plan(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    diet_api::delete_diet_plan(&state.api, user_id, DietPlanId(id))
        .await
        .map_err(http_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_generate_pdf(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PdfResponse>, HttpError> {
    let export = diet_api::generate_pdf(&state.api, user_id, DietPlanId(id))
        .await
        .map_err(http_error)?;
    Ok(Json(PdfResponse {
        diet_plan_id: DietPlanId(id),
        filename: export.filename,
        pdf_b64: STANDARD.encode(export.bytes),
    }))
}

async fn http_download_pdf(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let export = diet_api::generate_pdf(&state.api, user_id, DietPlanId(id))
        .await
        .map_err(http_error)?;
    let headers = attachment_headers("application/pdf", &export.filename);
    Ok((StatusCode::OK, headers, export.bytes))
}

async fn http_export_csv(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, HttpError> {
    let export = diet_api::export_csv(&state.api, user_id, DietPlanId(id))
        .await
        .map_err(http_error)?;
    let headers = attachment_headers("text/csv; charset=utf-8", &export.filename);
    Ok((StatusCode::OK, headers, export.content))
}

async fn http_evaluate_diet_plan(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<evals::EvalReport>, HttpError> {
    diet_api::evaluate_diet_plan(&state.api, user_id, DietPlanId(id))
        .await
        .map(Json)
        .map_err(http_error)
}

fn attachment_headers(content_type: &'static str, filename: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
