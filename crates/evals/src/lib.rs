//! Offline quality scoring for generated diet plans.
//!
//! Every evaluator is a pure function over a JSON meal array and an
//! [`EvalContext`], returning a score in `[0, 1]` and a short comment.
//! Evaluators read JSON rather than typed meals so malformed model output
//! can be scored instead of rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{DietPlan, Goal, UserProfile};
use shared::nutrition::daily_calorie_target;
use thiserror::Error;

mod evaluators;
mod fields;
pub mod reporter;

pub use evaluators::{
    evaluate_calorie_target, evaluate_day_coverage, evaluate_forbidden_ingredients,
    evaluate_macro_consistency, evaluate_macro_ratios, evaluate_meal_count,
    evaluate_meal_structure, evaluate_required_fields, evaluate_variety,
};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid plan JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no meal array found in {0}")]
    NoMeals(&'static str),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feedback endpoint rejected {key} with status {status}")]
    Rejected { key: String, status: u16 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalContext {
    pub calorie_target: f64,
    pub goal: Goal,
    #[serde(default)]
    pub forbidden_ingredients: Vec<String>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            calorie_target: 2000.0,
            goal: Goal::Maintenance,
            forbidden_ingredients: Vec::new(),
        }
    }
}

impl EvalContext {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            calorie_target: f64::from(daily_calorie_target(profile)),
            goal: profile.goal.unwrap_or(Goal::Maintenance),
            forbidden_ingredients: profile.forbidden_terms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub key: String,
    pub score: f64,
    pub comment: String,
}

impl EvalResult {
    pub(crate) fn new(key: &str, score: f64, comment: impl Into<String>) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            key: key.to_string(),
            score,
            comment: comment.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub results: Vec<EvalResult>,
    pub mean_score: f64,
}

impl EvalReport {
    pub fn result(&self, key: &str) -> Option<&EvalResult> {
        self.results.iter().find(|r| r.key == key)
    }
}

pub type Evaluator = fn(&[Value], &EvalContext) -> EvalResult;

pub fn default_suite() -> Vec<Evaluator> {
    vec![
        evaluate_meal_count,
        evaluate_day_coverage,
        evaluate_meal_structure,
        evaluate_required_fields,
        evaluate_calorie_target,
        evaluate_macro_ratios,
        evaluate_macro_consistency,
        evaluate_forbidden_ingredients,
        evaluate_variety,
    ]
}

pub fn run_suite(meals: &[Value], ctx: &EvalContext) -> EvalReport {
    run_evaluators(&default_suite(), meals, ctx)
}

pub fn run_evaluators(suite: &[Evaluator], meals: &[Value], ctx: &EvalContext) -> EvalReport {
    let results: Vec<EvalResult> = suite.iter().map(|evaluate| evaluate(meals, ctx)).collect();
    let mean_score = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
    };
    EvalReport {
        results,
        mean_score,
    }
}

pub fn evaluate_plan(plan: &DietPlan, ctx: &EvalContext) -> Result<EvalReport, EvalError> {
    let meals = plan
        .meals
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(run_suite(&meals, ctx))
}

/// Extracts the meal array from a bare array, `{"meals": [...]}`, or an
/// object nesting either under `plan`.
pub fn parse_meals(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("meals") {
                return Ok(items.clone());
            }
            match map.get("plan") {
                Some(inner @ Value::Object(_)) => parse_meals(inner),
                _ => Err(EvalError::NoMeals("object")),
            }
        }
        _ => Err(EvalError::NoMeals("scalar")),
    }
}

pub fn parse_meals_str(raw: &str) -> Result<Vec<Value>, EvalError> {
    let value: Value = serde_json::from_str(raw)?;
    parse_meals(&value)
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::full_week;

    #[test]
    fn well_formed_week_scores_highly() {
        let meals = full_week();
        let report = run_suite(&meals, &EvalContext::default());
        assert_eq!(report.results.len(), 9);
        assert_eq!(report.result("meal_count").expect("meal_count").score, 1.0);
        assert!(report.mean_score > 0.9, "mean was {}", report.mean_score);
    }

    #[test]
    fn empty_plan_scores_without_panicking() {
        let report = run_suite(&[], &EvalContext::default());
        assert!(report
            .results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.score)));
        assert_eq!(report.result("calorie_target").expect("calorie").score, 0.0);
    }

    #[test]
    fn parse_meals_accepts_known_shapes() {
        let meals = serde_json::json!([{ "name": "a" }]);
        assert_eq!(parse_meals(&meals).expect("array").len(), 1);
        let wrapped = serde_json::json!({ "meals": meals });
        assert_eq!(parse_meals(&wrapped).expect("object").len(), 1);
        let event = serde_json::json!({ "type": "plan_complete", "plan": wrapped });
        assert_eq!(parse_meals(&event).expect("nested").len(), 1);
        assert!(parse_meals(&serde_json::json!({ "days": [] })).is_err());
        assert!(parse_meals_str("not json").is_err());
    }

    #[test]
    fn mean_of_empty_suite_is_zero() {
        let report = run_evaluators(&[], &full_week(), &EvalContext::default());
        assert_eq!(report.mean_score, 0.0);
    }
}
