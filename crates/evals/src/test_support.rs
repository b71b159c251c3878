use serde_json::{json, Value};
use shared::domain::{DayOfWeek, MealType};

fn calories_for(meal_type: MealType) -> f64 {
    match meal_type {
        MealType::Breakfast => 500.0,
        MealType::Lunch => 700.0,
        MealType::Dinner => 600.0,
        MealType::Snack => 200.0,
    }
}

/// One meal with a 25/50/25 calorie split.
pub(crate) fn meal(day: DayOfWeek, meal_type: MealType, name: &str) -> Value {
    let calories = calories_for(meal_type);
    json!({
        "day": day.as_str(),
        "meal_type": meal_type.as_str(),
        "name": name,
        "description": format!("{name} for {}", day.label()),
        "ingredients": ["rice", "spinach", "olive oil"],
        "calories": calories,
        "protein_g": calories * 0.25 / 4.0,
        "carbs_g": calories * 0.50 / 4.0,
        "fat_g": calories * 0.25 / 9.0,
    })
}

/// 28 uniquely named meals totalling 2000 kcal per day.
pub(crate) fn full_week() -> Vec<Value> {
    DayOfWeek::ALL
        .iter()
        .flat_map(|day| {
            MealType::ALL
                .iter()
                .map(move |meal_type| meal(*day, *meal_type, &format!("{day} {meal_type}")))
        })
        .collect()
}
