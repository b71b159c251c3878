use std::collections::BTreeMap;

use serde_json::Value;
use shared::domain::DayOfWeek;
use shared::nutrition::{
    calories_from_macros, MacroSplit, KCAL_PER_GRAM_CARBS, KCAL_PER_GRAM_FAT,
    KCAL_PER_GRAM_PROTEIN,
};

use crate::{fields, EvalContext, EvalResult};

/// Stated calories may drift this far from the macro-derived figure.
const CONSISTENCY_TOLERANCE: f64 = 0.20;

/// Average daily calories against the target, over the days present.
pub fn evaluate_calorie_target(meals: &[Value], ctx: &EvalContext) -> EvalResult {
    let target = ctx.calorie_target;
    if target.is_nan() || target <= 0.0 {
        return EvalResult::new("calorie_target", 0.0, "no calorie target");
    }

    let mut per_day: BTreeMap<DayOfWeek, f64> = BTreeMap::new();
    for meal in meals {
        if let (Some(day), Some(calories)) = (fields::day(meal), fields::calories(meal)) {
            *per_day.entry(day).or_default() += calories;
        }
    }
    if per_day.is_empty() {
        return EvalResult::new("calorie_target", 0.0, "no meals with calories");
    }

    let average = per_day.values().sum::<f64>() / per_day.len() as f64;
    let deviation = (average - target).abs() / target;
    EvalResult::new(
        "calorie_target",
        1.0 - deviation,
        format!(
            "average {average:.0} kcal/day against {target:.0} ({:+.1}%)",
            (average - target) / target * 100.0
        ),
    )
}

/// Share of protein, carbs and fat that land inside the goal's band.
pub fn evaluate_macro_ratios(meals: &[Value], ctx: &EvalContext) -> EvalResult {
    let (mut protein, mut carbs, mut fat) = (0.0, 0.0, 0.0);
    for meal in meals {
        protein += fields::protein(meal).unwrap_or(0.0) * KCAL_PER_GRAM_PROTEIN;
        carbs += fields::carbs(meal).unwrap_or(0.0) * KCAL_PER_GRAM_CARBS;
        fat += fields::fat(meal).unwrap_or(0.0) * KCAL_PER_GRAM_FAT;
    }
    let total = protein + carbs + fat;
    if total <= 0.0 {
        return EvalResult::new("macro_ratios", 0.0, "no macronutrient data");
    }

    let split = MacroSplit::for_goal(ctx.goal);
    let checks = [
        ("protein", protein / total, split.protein),
        ("carbs", carbs / total, split.carbs),
        ("fat", fat / total, split.fat),
    ];
    let mut within = 0;
    let mut notes = Vec::with_capacity(checks.len());
    for (label, actual, expected) in checks {
        let (low, high) = MacroSplit::range(expected);
        // Rounded to avoid flagging 0.3 vs 0.30000000000000004.
        let actual_rounded = (actual * 1e6).round() / 1e6;
        if (low..=high).contains(&actual_rounded) {
            within += 1;
        }
        notes.push(format!(
            "{label} {:.0}% (target {:.0}%)",
            actual * 100.0,
            expected * 100.0
        ));
    }
    EvalResult::new(
        "macro_ratios",
        f64::from(within) / checks.len() as f64,
        notes.join(", "),
    )
}

/// Share of meals whose stated calories agree with 4/4/9 kcal per gram.
pub fn evaluate_macro_consistency(meals: &[Value], _ctx: &EvalContext) -> EvalResult {
    if meals.is_empty() {
        return EvalResult::new("macro_consistency", 0.0, "no meals");
    }
    let consistent = meals.iter().filter(|meal| is_consistent(meal)).count();
    EvalResult::new(
        "macro_consistency",
        consistent as f64 / meals.len() as f64,
        format!("{consistent} of {} meals consistent", meals.len()),
    )
}

fn is_consistent(meal: &Value) -> bool {
    let (Some(stated), Some(protein), Some(carbs), Some(fat)) = (
        fields::calories(meal),
        fields::protein(meal),
        fields::carbs(meal),
        fields::fat(meal),
    ) else {
        return false;
    };
    if stated <= 0.0 {
        return false;
    }
    let derived = calories_from_macros(protein, carbs, fat);
    (derived - stated).abs() / stated <= CONSISTENCY_TOLERANCE
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared::domain::{Goal, MealType};

    use super::*;
    use crate::test_support::{full_week, meal};

    #[test]
    fn calorie_target_is_exact_for_matching_week() {
        let result = evaluate_calorie_target(&full_week(), &EvalContext::default());
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn calorie_target_falls_off_linearly() {
        let ctx = EvalContext {
            calorie_target: 2500.0,
            ..EvalContext::default()
        };
        let result = evaluate_calorie_target(&full_week(), &ctx);
        assert!((result.score - 0.8).abs() < 1e-9, "score {}", result.score);

        let zero = EvalContext {
            calorie_target: 0.0,
            ..EvalContext::default()
        };
        assert_eq!(evaluate_calorie_target(&full_week(), &zero).score, 0.0);
    }

    #[test]
    fn macro_ratios_score_each_macro_against_goal_band() {
        let meals = full_week();
        assert_eq!(
            evaluate_macro_ratios(&meals, &EvalContext::default()).score,
            1.0
        );

        // 50/35/15 by calories misses the maintenance band on every macro.
        let skewed = vec![json!({
            "protein_g": 50.0,
            "carbs_g": 35.0,
            "fat_g": 60.0 / 9.0,
        })];
        let ctx = EvalContext {
            goal: Goal::Maintenance,
            ..EvalContext::default()
        };
        let result = evaluate_macro_ratios(&skewed, &ctx);
        assert_eq!(result.score, 0.0);
        assert!(result.comment.starts_with("protein 50%"));
    }

    #[test]
    fn macro_ratios_without_data_is_zero() {
        let meals = vec![json!({ "name": "water" })];
        assert_eq!(
            evaluate_macro_ratios(&meals, &EvalContext::default()).score,
            0.0
        );
    }

    #[test]
    fn consistency_flags_inflated_calories() {
        let mut meals = vec![
            meal(DayOfWeek::Monday, MealType::Lunch, "Bowl"),
            meal(DayOfWeek::Monday, MealType::Dinner, "Stew"),
        ];
        meals[1]["calories"] = json!(2000);
        let result = evaluate_macro_consistency(&meals, &EvalContext::default());
        assert_eq!(result.score, 0.5);

        meals[0]["calories"] = json!(0);
        assert_eq!(
            evaluate_macro_consistency(&meals, &EvalContext::default()).score,
            0.0
        );
    }
}
