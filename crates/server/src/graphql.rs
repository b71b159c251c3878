//! GraphQL surface over the same `diet_api` operations as the REST routes.
//!
//! Failures come back in the `errors` array with `extensions.code` set to
//! the `ErrorCode` spelling, e.g. `"unauthorized"` or `"not_found"`.

use std::str::FromStr;

use async_graphql::{
    Context, EmptySubscription, Error, ErrorExtensions, InputObject, Object, Result, Schema,
    SimpleObject,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use diet_api::ApiContext;
use evals::EvalReport;
use shared::{
    domain::{DietPlan, DietPlanId, MealDraft, UserId, UserProfile},
    error::{ApiError, ErrorCode},
    nutrition::daily_calorie_target,
    protocol::{
        ChangePasswordRequest, GenerateDietPlanRequest, LoginRequest, ProfileUpdate,
        RegisterRequest,
    },
};
use tracing::error;

pub(crate) type DietSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Bearer token of the current request, if one was sent.
pub(crate) struct Viewer(pub(crate) Option<String>);

pub(crate) fn build_schema(api: ApiContext) -> DietSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(api)
        .finish()
}

pub(crate) fn gql_error(err: ApiError) -> Error {
    if err.code == ErrorCode::Internal {
        error!(message = %err.message, "graphql request failed");
    }
    let code = err.code.as_str();
    Error::new(err.message).extend_with(|_, ext| ext.set("code", code))
}

fn api<'a>(ctx: &Context<'a>) -> Result<&'a ApiContext> {
    ctx.data::<ApiContext>()
}

async fn viewer(ctx: &Context<'_>) -> Result<UserId> {
    let token = ctx
        .data_opt::<Viewer>()
        .and_then(|viewer| viewer.0.as_deref())
        .ok_or_else(|| gql_error(ApiError::unauthorized("missing bearer token")))?;
    diet_api::authenticate(api(ctx)?, token)
        .await
        .map_err(gql_error)
}

fn parse_enum<T>(field: &str, value: Option<String>) -> Result<Option<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|err| ApiError::validation(format!("{field}: {err}")))
        })
        .transpose()
}

#[derive(SimpleObject)]
#[graphql(name = "User")]
pub(crate) struct UserObject {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    age: Option<u32>,
    sex: Option<String>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    goal: Option<String>,
    activity_level: Option<String>,
    dietary_restrictions: Vec<String>,
    allergies: Vec<String>,
    daily_calorie_target: u32,
    created_at: DateTime<Utc>,
}

impl From<UserProfile> for UserObject {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.user_id.0,
            daily_calorie_target: daily_calorie_target(&profile),
            email: profile.email,
            first_name: profile.first_name,
            last_name: profile.last_name,
            age: profile.age,
            sex: profile.sex.map(|sex| sex.as_str().to_string()),
            height_cm: profile.height_cm,
            weight_kg: profile.weight_kg,
            goal: profile.goal.map(|goal| goal.as_str().to_string()),
            activity_level: profile
                .activity_level
                .map(|level| level.as_str().to_string()),
            dietary_restrictions: profile.dietary_restrictions,
            allergies: profile.allergies,
            created_at: profile.created_at,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "Meal")]
pub(crate) struct MealObject {
    day: String,
    meal_type: String,
    name: String,
    description: String,
    ingredients: Vec<String>,
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    instructions: String,
}

impl From<MealDraft> for MealObject {
    fn from(meal: MealDraft) -> Self {
        Self {
            day: meal.day.as_str().to_string(),
            meal_type: meal.meal_type.as_str().to_string(),
            name: meal.name,
            description: meal.description,
            ingredients: meal.ingredients,
            calories: meal.calories,
            protein: meal.protein_g,
            carbs: meal.carbs_g,
            fat: meal.fat_g,
            instructions: meal.instructions,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "DietPlan")]
pub(crate) struct DietPlanObject {
    /// Null for plans generated with `save: false`.
    id: Option<i64>,
    name: String,
    week_start: NaiveDate,
    week_end: NaiveDate,
    target_calories: u32,
    meals: Vec<MealObject>,
    created_at: DateTime<Utc>,
}

impl From<DietPlan> for DietPlanObject {
    fn from(plan: DietPlan) -> Self {
        Self {
            id: plan.diet_plan_id.map(|id| id.0),
            name: plan.name,
            week_start: plan.week_start,
            week_end: plan.week_end,
            target_calories: plan.target_calories,
            meals: plan.meals.into_iter().map(MealObject::from).collect(),
            created_at: plan.created_at,
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct AuthPayload {
    token: String,
    user: UserObject,
}

#[derive(SimpleObject)]
pub(crate) struct PdfPayload {
    diet_plan_id: i64,
    filename: String,
    pdf_b64: String,
}

#[derive(SimpleObject)]
#[graphql(name = "EvalResult")]
pub(crate) struct EvalResultObject {
    key: String,
    score: f64,
    comment: String,
}

#[derive(SimpleObject)]
#[graphql(name = "EvalReport")]
pub(crate) struct EvalReportObject {
    results: Vec<EvalResultObject>,
    mean_score: f64,
}

impl From<EvalReport> for EvalReportObject {
    fn from(report: EvalReport) -> Self {
        Self {
            results: report
                .results
                .into_iter()
                .map(|result| EvalResultObject {
                    key: result.key,
                    score: result.score,
                    comment: result.comment,
                })
                .collect(),
            mean_score: report.mean_score,
        }
    }
}

#[derive(InputObject)]
pub(crate) struct ProfileInput {
    first_name: Option<String>,
    last_name: Option<String>,
    age: Option<u32>,
    sex: Option<String>,
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    goal: Option<String>,
    activity_level: Option<String>,
    dietary_restrictions: Option<Vec<String>>,
    allergies: Option<Vec<String>>,
}

impl ProfileInput {
    fn into_update(self) -> Result<ProfileUpdate, ApiError> {
        Ok(ProfileUpdate {
            first_name: self.first_name,
            last_name: self.last_name,
            age: self.age,
            sex: parse_enum("sex", self.sex)?,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            goal: parse_enum("goal", self.goal)?,
            activity_level: parse_enum("activityLevel", self.activity_level)?,
            dietary_restrictions: self.dietary_restrictions,
            allergies: self.allergies,
        })
    }
}

#[derive(InputObject)]
pub(crate) struct RegisterInput {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    profile: Option<ProfileInput>,
}

#[derive(InputObject)]
pub(crate) struct GenerateDietPlanInput {
    name: Option<String>,
    /// Any date inside the target week.
    week_start: Option<NaiveDate>,
    preferences: Option<String>,
    target_calories: Option<u32>,
    #[graphql(default = true)]
    save: bool,
}

impl From<GenerateDietPlanInput> for GenerateDietPlanRequest {
    fn from(input: GenerateDietPlanInput) -> Self {
        Self {
            name: input.name,
            week_start: input.week_start,
            preferences: input.preferences,
            target_calories: input.target_calories,
            save: input.save,
        }
    }
}

pub(crate) struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn me(&self, ctx: &Context<'_>) -> Result<UserObject> {
        let user_id = viewer(ctx).await?;
        diet_api::current_user(api(ctx)?, user_id)
            .await
            .map(UserObject::from)
            .map_err(gql_error)
    }

    async fn get_all_diet_plans(&self, ctx: &Context<'_>) -> Result<Vec<DietPlanObject>> {
        let user_id = viewer(ctx).await?;
        let plans = diet_api::get_all_diet_plans(api(ctx)?, user_id)
            .await
            .map_err(gql_error)?;
        Ok(plans.into_iter().map(DietPlanObject::from).collect())
    }

    async fn diet_plan(&self, ctx: &Context<'_>, id: i64) -> Result<DietPlanObject> {
        let user_id = viewer(ctx).await?;
        diet_api::get_diet_plan(api(ctx)?, user_id, DietPlanId(id))
            .await
            .map(DietPlanObject::from)
            .map_err(gql_error)
    }

    async fn evaluate_diet_plan(&self, ctx: &Context<'_>, id: i64) -> Result<EvalReportObject> {
        let user_id = viewer(ctx).await?;
        diet_api::evaluate_diet_plan(api(ctx)?, user_id, DietPlanId(id))
            .await
            .map(EvalReportObject::from)
            .map_err(gql_error)
    }
}

pub(crate) struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn register(&self, ctx: &Context<'_>, input: RegisterInput) -> Result<AuthPayload> {
        let profile = input
            .profile
            .map(ProfileInput::into_update)
            .transpose()
            .map_err(gql_error)?;
        let request = RegisterRequest {
            email: input.email,
            password: input.password,
            first_name: input.first_name,
            last_name: input.last_name,
            profile,
        };
        let auth = diet_api::register(api(ctx)?, request)
            .await
            .map_err(gql_error)?;
        Ok(AuthPayload {
            token: auth.token,
            user: auth.user.into(),
        })
    }

    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> Result<AuthPayload> {
        let auth = diet_api::login(api(ctx)?, LoginRequest { email, password })
            .await
            .map_err(gql_error)?;
        Ok(AuthPayload {
            token: auth.token,
            user: auth.user.into(),
        })
    }

    async fn update_profile(&self, ctx: &Context<'_>, input: ProfileInput) -> Result<UserObject> {
        let user_id = viewer(ctx).await?;
        let update = input.into_update().map_err(gql_error)?;
        diet_api::update_profile(api(ctx)?, user_id, update)
            .await
            .map(UserObject::from)
            .map_err(gql_error)
    }

    async fn change_password(
        &self,
        ctx: &Context<'_>,
        current_password: String,
        new_password: String,
    ) -> Result<bool> {
        let user_id = viewer(ctx).await?;
        let request = ChangePasswordRequest {
            current_password,
            new_password,
        };
        diet_api::change_password(api(ctx)?, user_id, request)
            .await
            .map_err(gql_error)?;
        Ok(true)
    }

    async fn delete_account(&self, ctx: &Context<'_>) -> Result<bool> {
        let user_id = viewer(ctx).await?;
        diet_api::delete_account(api(ctx)?, user_id)
            .await
            .map_err(gql_error)?;
        Ok(true)
    }

    /// Generates all seven days before responding. Use the
    /// `/api/generate-diet-plan-stream` endpoint for progress events.
    async fn generate_diet_plan(
        &self,
        ctx: &Context<'_>,
        input: Option<GenerateDietPlanInput>,
    ) -> Result<DietPlanObject> {
        let user_id = viewer(ctx).await?;
        let request = input.map(GenerateDietPlanRequest::from).unwrap_or(
            GenerateDietPlanRequest {
                save: true,
                ..GenerateDietPlanRequest::default()
            },
        );
        diet_api::generate_diet_plan(api(ctx)?, user_id, request)
            .await
            .map(DietPlanObject::from)
            .map_err(gql_error)
    }

    async fn rename_diet_plan(
        &self,
        ctx: &Context<'_>,
        id: i64,
        name: String,
    ) -> Result<DietPlanObject> {
        let user_id = viewer(ctx).await?;
        diet_api::rename_diet_plan(api(ctx)?, user_id, DietPlanId(id), &name)
            .await
            .map(DietPlanObject::from)
            .map_err(gql_error)
    }

    async fn delete_diet_plan(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let user_id = viewer(ctx).await?;
        diet_api::delete_diet_plan(api(ctx)?, user_id, DietPlanId(id))
            .await
            .map_err(gql_error)?;
        Ok(true)
    }

    #[graphql(name = "generatePDF")]
    async fn generate_pdf(&self, ctx: &Context<'_>, id: i64) -> Result<PdfPayload> {
        let user_id = viewer(ctx).await?;
        let export = diet_api::generate_pdf(api(ctx)?, user_id, DietPlanId(id))
            .await
            .map_err(gql_error)?;
        Ok(PdfPayload {
            diet_plan_id: id,
            filename: export.filename,
            pdf_b64: STANDARD.encode(export.bytes),
        })
    }
}
