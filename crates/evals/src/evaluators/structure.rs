use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde_json::Value;
use shared::domain::{DayOfWeek, MealType, MEALS_PER_WEEK};

use crate::{fields, EvalContext, EvalResult};

/// Scores 1 only when the plan holds exactly one meal per day and meal type.
pub fn evaluate_meal_count(meals: &[Value], _ctx: &EvalContext) -> EvalResult {
    let count = meals.len();
    if count == MEALS_PER_WEEK {
        EvalResult::new("meal_count", 1.0, format!("{count} meals"))
    } else {
        EvalResult::new(
            "meal_count",
            0.0,
            format!("expected {MEALS_PER_WEEK} meals, found {count}"),
        )
    }
}

pub fn evaluate_day_coverage(meals: &[Value], _ctx: &EvalContext) -> EvalResult {
    let days: BTreeSet<DayOfWeek> = meals.iter().filter_map(fields::day).collect();
    let total = DayOfWeek::ALL.len();
    let missing: Vec<&str> = DayOfWeek::ALL
        .iter()
        .filter(|day| !days.contains(*day))
        .map(|day| day.as_str())
        .collect();
    let comment = if missing.is_empty() {
        "all days covered".to_string()
    } else {
        format!("missing days: {}", missing.join(", "))
    };
    EvalResult::new(
        "day_coverage",
        days.len() as f64 / total as f64,
        comment,
    )
}

/// Fraction of the seven days that have every meal type.
pub fn evaluate_meal_structure(meals: &[Value], _ctx: &EvalContext) -> EvalResult {
    let mut by_day: BTreeMap<DayOfWeek, HashSet<MealType>> = BTreeMap::new();
    for meal in meals {
        if let (Some(day), Some(meal_type)) = (fields::day(meal), fields::meal_type(meal)) {
            by_day.entry(day).or_default().insert(meal_type);
        }
    }

    let incomplete: Vec<&str> = DayOfWeek::ALL
        .iter()
        .filter(|day| {
            by_day
                .get(*day)
                .map_or(true, |types| types.len() < MealType::ALL.len())
        })
        .map(|day| day.as_str())
        .collect();
    let complete = DayOfWeek::ALL.len() - incomplete.len();
    let comment = if incomplete.is_empty() {
        "every day has breakfast, lunch, dinner and snack".to_string()
    } else {
        format!("incomplete days: {}", incomplete.join(", "))
    };
    EvalResult::new(
        "meal_structure",
        complete as f64 / DayOfWeek::ALL.len() as f64,
        comment,
    )
}

pub fn evaluate_required_fields(meals: &[Value], _ctx: &EvalContext) -> EvalResult {
    if meals.is_empty() {
        return EvalResult::new("required_fields", 0.0, "no meals");
    }
    let valid = meals.iter().filter(|meal| has_required_fields(meal)).count();
    EvalResult::new(
        "required_fields",
        valid as f64 / meals.len() as f64,
        format!("{valid} of {} meals complete", meals.len()),
    )
}

fn has_required_fields(meal: &Value) -> bool {
    fields::day(meal).is_some()
        && fields::meal_type(meal).is_some()
        && fields::name(meal).is_some()
        && fields::ingredients(meal).is_some_and(|items| !items.is_empty())
        && fields::calories(meal).is_some()
        && fields::protein(meal).is_some()
        && fields::carbs(meal).is_some()
        && fields::fat(meal).is_some()
}

/// Share of distinct meal names, compared case-insensitively.
pub fn evaluate_variety(meals: &[Value], _ctx: &EvalContext) -> EvalResult {
    let names: Vec<String> = meals
        .iter()
        .filter_map(fields::name)
        .map(str::to_lowercase)
        .collect();
    if names.is_empty() {
        return EvalResult::new("variety", 0.0, "no named meals");
    }
    let distinct: HashSet<&String> = names.iter().collect();
    EvalResult::new(
        "variety",
        distinct.len() as f64 / names.len() as f64,
        format!("{} distinct of {} meals", distinct.len(), names.len()),
    )
}
