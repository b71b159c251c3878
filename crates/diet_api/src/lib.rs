use std::sync::Arc;

use evals::{evaluate_plan, EvalContext, EvalReport};
use llm::MealGenerator;
use shared::{
    domain::{DietPlan, DietPlanId, UserId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        AuthResponse, ChangePasswordRequest, GenerateDietPlanRequest, LoginRequest,
        ProfileUpdate, RegisterRequest, StreamEvent,
    },
    validation::{validate_name, validate_password, validate_profile, validate_registration},
};
use storage::{NewUser, Storage};
use tokio::sync::mpsc;
use tracing::{error, info};

pub mod auth;
pub mod export;
pub mod generation;

pub use auth::AuthConfig;
pub use export::{CsvExport, PdfExport};

use generation::GenerationError;

pub const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
    pub generator: Arc<dyn MealGenerator>,
}

pub async fn register(ctx: &ApiContext, request: RegisterRequest) -> Result<AuthResponse, ApiError> {
    validate_registration(&request).map_err(ApiError::validation)?;
    let email = request.email.trim().to_lowercase();
    let password_hash = auth::hash_password(&request.password)?;
    // The UNIQUE email column decides duplicates, so concurrent sign-ups
    // with one address cannot both succeed.
    let user_id = ctx
        .storage
        .create_user(NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name: &request.first_name,
            last_name: &request.last_name,
        })
        .await
        .map_err(|err| {
            if storage::is_unique_violation(&err) {
                ApiError::new(ErrorCode::Conflict, "an account with this email already exists")
            } else {
                internal(err)
            }
        })?;
    if let Some(profile) = &request.profile {
        ctx.storage
            .update_profile(user_id, profile)
            .await
            .map_err(internal)?;
    }
    info!(user_id = user_id.0, "user registered");

    let user = load_profile(ctx, user_id).await?;
    let token = auth::issue_token(&ctx.auth, user_id)?;
    Ok(AuthResponse { token, user })
}

pub async fn login(ctx: &ApiContext, request: LoginRequest) -> Result<AuthResponse, ApiError> {
    let stored = ctx
        .storage
        .user_by_email(&request.email)
        .await
        .map_err(internal)?;
    // Same message for unknown email and wrong password.
    let Some(stored) = stored.filter(|s| auth::verify_password(&request.password, &s.password_hash))
    else {
        return Err(ApiError::unauthorized("invalid email or password"));
    };
    let token = auth::issue_token(&ctx.auth, stored.profile.user_id)?;
    Ok(AuthResponse {
        token,
        user: stored.profile,
    })
}

/// Resolves a bearer token to a user that still exists.
pub async fn authenticate(ctx: &ApiContext, token: &str) -> Result<UserId, ApiError> {
    let user_id = auth::verify_token(&ctx.auth, token)?;
    load_profile(ctx, user_id).await?;
    Ok(user_id)
}

pub async fn current_user(ctx: &ApiContext, user_id: UserId) -> Result<UserProfile, ApiError> {
    load_profile(ctx, user_id).await
}

pub async fn update_profile(
    ctx: &ApiContext,
    user_id: UserId,
    update: ProfileUpdate,
) -> Result<UserProfile, ApiError> {
    validate_profile(&update).map_err(ApiError::validation)?;
    let updated = ctx
        .storage
        .update_profile(user_id, &update)
        .await
        .map_err(internal)?;
    if !updated {
        return Err(ApiError::unauthorized("user no longer exists"));
    }
    load_profile(ctx, user_id).await
}

pub async fn change_password(
    ctx: &ApiContext,
    user_id: UserId,
    request: ChangePasswordRequest,
) -> Result<(), ApiError> {
    let stored = ctx
        .storage
        .user_by_id(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::unauthorized("user no longer exists"))?;
    if !auth::verify_password(&request.current_password, &stored.password_hash) {
        return Err(ApiError::validation("current password is incorrect"));
    }
    validate_password(&request.new_password).map_err(ApiError::validation)?;
    let password_hash = auth::hash_password(&request.new_password)?;
    ctx.storage
        .update_password_hash(user_id, &password_hash)
        .await
        .map_err(internal)?;
    info!(user_id = user_id.0, "password changed");
    Ok(())
}

pub async fn delete_account(ctx: &ApiContext, user_id: UserId) -> Result<(), ApiError> {
    let deleted = ctx.storage.delete_user(user_id).await.map_err(internal)?;
    if !deleted {
        return Err(ApiError::unauthorized("user no longer exists"));
    }
    info!(user_id = user_id.0, "account deleted");
    Ok(())
}

/// Generates all seven days before returning; persists when `save` is set.
pub async fn generate_diet_plan(
    ctx: &ApiContext,
    user_id: UserId,
    request: GenerateDietPlanRequest,
) -> Result<DietPlan, ApiError> {
    let job = generation::prepare(ctx, user_id, &request).await?;
    match generation::run(ctx, job, None).await {
        Ok(plan) => Ok(plan),
        Err(GenerationError::Api(err)) => Err(err),
        Err(GenerationError::Cancelled) => Err(ApiError::new(
            ErrorCode::Internal,
            "generation cancelled",
        )),
    }
}

/// Validates the request, then generates on a background task. Events
/// arrive on the returned receiver; dropping it aborts generation before
/// the next model call.
pub async fn stream_diet_plan(
    ctx: &ApiContext,
    user_id: UserId,
    request: GenerateDietPlanRequest,
) -> Result<mpsc::Receiver<StreamEvent>, ApiError> {
    let job = generation::prepare(ctx, user_id, &request).await?;
    let (tx, rx) = mpsc::channel(generation::STREAM_CHANNEL_CAPACITY);
    tokio::spawn(generation::run_streaming(ctx.clone(), job, tx));
    Ok(rx)
}

pub async fn get_all_diet_plans(ctx: &ApiContext, user_id: UserId) -> Result<Vec<DietPlan>, ApiError> {
    ctx.storage
        .list_diet_plans(user_id)
        .await
        .map_err(internal)
}

pub async fn get_diet_plan(
    ctx: &ApiContext,
    user_id: UserId,
    diet_plan_id: DietPlanId,
) -> Result<DietPlan, ApiError> {
    let plan = ctx
        .storage
        .load_diet_plan(diet_plan_id)
        .await
        .map_err(internal)?;
    match plan {
        Some(plan) if plan.user_id == user_id => Ok(plan),
        _ => Err(plan_not_found(diet_plan_id)),
    }
}

pub async fn rename_diet_plan(
    ctx: &ApiContext,
    user_id: UserId,
    diet_plan_id: DietPlanId,
    name: &str,
) -> Result<DietPlan, ApiError> {
    validate_name("plan name", name).map_err(ApiError::validation)?;
    let renamed = ctx
        .storage
        .rename_diet_plan(user_id, diet_plan_id, name.trim())
        .await
        .map_err(internal)?;
    if !renamed {
        return Err(plan_not_found(diet_plan_id));
    }
    get_diet_plan(ctx, user_id, diet_plan_id).await
}

pub async fn delete_diet_plan(
    ctx: &ApiContext,
    user_id: UserId,
    diet_plan_id: DietPlanId,
) -> Result<(), ApiError> {
    let deleted = ctx
        .storage
        .delete_diet_plan(user_id, diet_plan_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(plan_not_found(diet_plan_id));
    }
    info!(user_id = user_id.0, diet_plan_id = diet_plan_id.0, "diet plan deleted");
    Ok(())
}

pub async fn generate_pdf(
    ctx: &ApiContext,
    user_id: UserId,
    diet_plan_id: DietPlanId,
) -> Result<PdfExport, ApiError> {
    let plan = get_diet_plan(ctx, user_id, diet_plan_id).await?;
    let bytes = export::render_pdf(&plan).map_err(internal)?;
    Ok(PdfExport {
        filename: format!("{}.pdf", export::file_stem(&plan)),
        bytes,
    })
}

pub async fn export_csv(
    ctx: &ApiContext,
    user_id: UserId,
    diet_plan_id: DietPlanId,
) -> Result<CsvExport, ApiError> {
    let plan = get_diet_plan(ctx, user_id, diet_plan_id).await?;
    let content = export::render_csv(&plan).map_err(internal)?;
    Ok(CsvExport {
        filename: format!("{}.csv", export::file_stem(&plan)),
        content,
    })
}

/// Scores a saved plan against its own calorie target and the owner's
/// current restrictions.
pub async fn evaluate_diet_plan(
    ctx: &ApiContext,
    user_id: UserId,
    diet_plan_id: DietPlanId,
) -> Result<EvalReport, ApiError> {
    let plan = get_diet_plan(ctx, user_id, diet_plan_id).await?;
    let profile = load_profile(ctx, user_id).await?;
    let eval_ctx = EvalContext {
        calorie_target: f64::from(plan.target_calories),
        ..EvalContext::from_profile(&profile)
    };
    evaluate_plan(&plan, &eval_ctx).map_err(|e| internal(e.into()))
}

async fn load_profile(ctx: &ApiContext, user_id: UserId) -> Result<UserProfile, ApiError> {
    ctx.storage
        .user_by_id(user_id)
        .await
        .map_err(internal)?
        .map(|stored| stored.profile)
        .ok_or_else(|| ApiError::unauthorized("user no longer exists"))
}

fn plan_not_found(diet_plan_id: DietPlanId) -> ApiError {
    ApiError::not_found(format!("diet plan {} not found", diet_plan_id.0))
}

/// Logs the full error chain; clients only see a generic message.
pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    error!(error = ?err, "internal error");
    ApiError::new(ErrorCode::Internal, INTERNAL_MESSAGE)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
