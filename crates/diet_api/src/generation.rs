//! Day-by-day plan generation shared by the blocking and streaming paths.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use llm::{DayRequest, LlmError};
use shared::{
    domain::{DayOfWeek, DietPlan, Goal, MealDraft, UserId},
    error::{ApiError, ErrorCode},
    nutrition::{daily_calorie_target, NutritionTargets, MIN_CALORIE_TARGET},
    protocol::{percent_complete, GenerateDietPlanRequest, StreamEvent},
    validation::{validate_name, MAX_NAME_LEN},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{internal, ApiContext};

pub const MAX_CALORIE_TARGET: u32 = 5000;
pub const MAX_PREFERENCES_LEN: usize = 500;
pub const STREAM_CHANNEL_CAPACITY: usize = 32;

/// A validated request, ready to run against the model.
#[derive(Debug, Clone)]
pub(crate) struct GenerationJob {
    pub generation_id: String,
    pub user_id: UserId,
    pub name: String,
    pub week_start: NaiveDate,
    pub goal: Goal,
    pub targets: NutritionTargets,
    pub forbidden_ingredients: Vec<String>,
    pub preferences: Option<String>,
    pub save: bool,
}

pub(crate) enum GenerationError {
    Api(ApiError),
    /// The stream consumer went away.
    Cancelled,
}

impl From<ApiError> for GenerationError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

/// Monday of the week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// The coming Monday, which is `today` itself on a Monday.
pub fn upcoming_monday(today: NaiveDate) -> NaiveDate {
    let ahead = (7 - today.weekday().num_days_from_monday()) % 7;
    today + Duration::days(i64::from(ahead))
}

pub(crate) async fn prepare(
    ctx: &ApiContext,
    user_id: UserId,
    request: &GenerateDietPlanRequest,
) -> Result<GenerationJob, ApiError> {
    let profile = ctx
        .storage
        .user_by_id(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::unauthorized("user no longer exists"))?
        .profile;

    if let Some(name) = &request.name {
        validate_name("plan name", name).map_err(ApiError::validation)?;
    }
    let preferences = request
        .preferences
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    if preferences
        .as_ref()
        .is_some_and(|p| p.chars().count() > MAX_PREFERENCES_LEN)
    {
        return Err(ApiError::validation(format!(
            "preferences must be at most {MAX_PREFERENCES_LEN} characters"
        )));
    }
    let calories = match request.target_calories {
        Some(calories) if !(MIN_CALORIE_TARGET..=MAX_CALORIE_TARGET).contains(&calories) => {
            return Err(ApiError::validation(format!(
                "target calories must be between {MIN_CALORIE_TARGET} and {MAX_CALORIE_TARGET}"
            )));
        }
        Some(calories) => calories,
        None => daily_calorie_target(&profile),
    };

    let week_start = match request.week_start {
        Some(date) => week_start_for(date),
        None => upcoming_monday(Utc::now().date_naive()),
    };
    let goal = profile.goal.unwrap_or(Goal::Maintenance);
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .map(str::to_string)
        .unwrap_or_else(|| default_plan_name(&profile.first_name, week_start));

    Ok(GenerationJob {
        generation_id: Uuid::new_v4().to_string(),
        user_id,
        name,
        week_start,
        goal,
        targets: NutritionTargets::for_calories(calories, goal),
        forbidden_ingredients: profile.forbidden_terms(),
        preferences,
        save: request.save,
    })
}

/// "{first}'s plan for week of Oct 19", with the first name shortened so the
/// result still passes `validate_name`.
fn default_plan_name(first_name: &str, week_start: NaiveDate) -> String {
    let suffix = format!("'s plan for week of {}", week_start.format("%b %-d"));
    let room = MAX_NAME_LEN.saturating_sub(suffix.chars().count());
    let first: String = first_name.trim().chars().take(room).collect();
    format!("{}{suffix}", first.trim_end())
}

fn upstream(err: LlmError) -> ApiError {
    ApiError::new(ErrorCode::Upstream, format!("meal generation failed: {err}"))
}

/// Emits progress when a sender is attached. A closed channel cancels.
struct Emitter<'a> {
    sender: Option<&'a mpsc::Sender<StreamEvent>>,
}

impl Emitter<'_> {
    async fn emit(&self, event: impl FnOnce() -> StreamEvent) -> Result<(), GenerationError> {
        match self.sender {
            Some(sender) => sender
                .send(event())
                .await
                .map_err(|_| GenerationError::Cancelled),
            None => Ok(()),
        }
    }
}

pub(crate) async fn run(
    ctx: &ApiContext,
    job: GenerationJob,
    sender: Option<&mpsc::Sender<StreamEvent>>,
) -> Result<DietPlan, GenerationError> {
    let emitter = Emitter { sender };
    let total_days = DayOfWeek::ALL.len() as u32;
    info!(
        generation_id = %job.generation_id,
        user_id = job.user_id.0,
        model = ctx.generator.model_id(),
        calories = job.targets.calories,
        "diet plan generation started"
    );
    emitter
        .emit(|| StreamEvent::Start {
            generation_id: job.generation_id.clone(),
            total_days,
            target_calories: job.targets.calories,
        })
        .await?;

    let mut meals: Vec<MealDraft> = Vec::with_capacity(DayOfWeek::ALL.len() * 4);
    for (index, day) in DayOfWeek::ALL.into_iter().enumerate() {
        let done = index as u32;
        emitter
            .emit(|| StreamEvent::Progress {
                day,
                days_completed: done,
                total_days,
                percent: percent_complete(done, total_days),
                message: format!("Generating meals for {}", day.label()),
            })
            .await?;

        let request = DayRequest {
            day,
            goal: job.goal,
            targets: job.targets,
            forbidden_ingredients: job.forbidden_ingredients.clone(),
            preferences: job.preferences.clone(),
            previous_meal_names: meals.iter().map(|meal| meal.name.clone()).collect(),
        };
        let day_meals = ctx.generator.generate_day(&request).await.map_err(|e| {
            warn!(generation_id = %job.generation_id, %day, error = %e, "day generation failed");
            upstream(e)
        })?;

        for meal in &day_meals {
            emitter
                .emit(|| StreamEvent::MealStreaming {
                    day,
                    meal: meal.clone(),
                })
                .await?;
        }
        emitter
            .emit(|| StreamEvent::DayComplete {
                day,
                days_completed: done + 1,
                meals: day_meals.clone(),
            })
            .await?;
        debug!(generation_id = %job.generation_id, %day, count = day_meals.len(), "day complete");
        meals.extend(day_meals);
    }

    let mut plan = DietPlan {
        diet_plan_id: None,
        user_id: job.user_id,
        name: job.name,
        week_start: job.week_start,
        week_end: job.week_start + Duration::days(6),
        target_calories: job.targets.calories,
        meals,
        created_at: Utc::now(),
    };
    plan.sort_meals();
    if job.save {
        let id = ctx.storage.insert_diet_plan(&plan).await.map_err(internal)?;
        plan.diet_plan_id = Some(id);
    }
    info!(
        generation_id = %job.generation_id,
        diet_plan_id = plan.diet_plan_id.map(|id| id.0),
        meals = plan.meals.len(),
        "diet plan generation finished"
    );

    emitter
        .emit(|| StreamEvent::PlanComplete { plan: plan.clone() })
        .await?;
    Ok(plan)
}

/// Drives `run` and turns failures into one terminal `error` event.
pub(crate) async fn run_streaming(ctx: ApiContext, job: GenerationJob, sender: mpsc::Sender<StreamEvent>) {
    let generation_id = job.generation_id.clone();
    match run(&ctx, job, Some(&sender)).await {
        Ok(_) => {}
        Err(GenerationError::Cancelled) => {
            info!(%generation_id, "stream closed by client, generation aborted");
        }
        Err(GenerationError::Api(err)) => {
            let _ = sender
                .send(StreamEvent::Error {
                    message: err.message,
                })
                .await;
        }
    }
}
