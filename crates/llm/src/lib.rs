//! Meal synthesis through a large-language-model provider.
//!
//! `MealGenerator` is the seam the API layer depends on; the
//! OpenAI-compatible backend is the production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{DayOfWeek, Goal, MealDraft},
    nutrition::NutritionTargets,
};
use thiserror::Error;

mod backend;
mod parse;
pub mod prompt;

pub use backend::{OpenAiCompatibleBackend, OpenAiConfig};
pub use parse::parse_day_response;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

/// Everything the model needs to plan one day of meals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayRequest {
    pub day: DayOfWeek,
    pub goal: Goal,
    pub targets: NutritionTargets,
    #[serde(default)]
    pub forbidden_ingredients: Vec<String>,
    #[serde(default)]
    pub preferences: Option<String>,
    /// Meal names already used this week, offered to the model to avoid repeats.
    #[serde(default)]
    pub previous_meal_names: Vec<String>,
}

#[async_trait]
pub trait MealGenerator: Send + Sync {
    async fn generate_day(&self, request: &DayRequest) -> Result<Vec<MealDraft>, LlmError>;
    fn model_id(&self) -> &str;
}
