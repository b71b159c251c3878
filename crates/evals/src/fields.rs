use serde_json::Value;
use shared::domain::{DayOfWeek, MealType};

const DAY_KEYS: &[&str] = &["day", "day_of_week", "dayOfWeek"];
const MEAL_TYPE_KEYS: &[&str] = &["meal_type", "mealType", "type"];
const CALORIE_KEYS: &[&str] = &["calories", "kcal"];
const PROTEIN_KEYS: &[&str] = &["protein_g", "protein"];
const CARB_KEYS: &[&str] = &["carbs_g", "carbs", "carbohydrates"];
const FAT_KEYS: &[&str] = &["fat_g", "fat"];

fn field<'a>(meal: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| meal.get(*key))
}

pub(crate) fn day(meal: &Value) -> Option<DayOfWeek> {
    field(meal, DAY_KEYS)?.as_str()?.parse().ok()
}

pub(crate) fn meal_type(meal: &Value) -> Option<MealType> {
    field(meal, MEAL_TYPE_KEYS)?.as_str()?.parse().ok()
}

pub(crate) fn name(meal: &Value) -> Option<&str> {
    meal.get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

fn number(meal: &Value, keys: &[&str]) -> Option<f64> {
    field(meal, keys)?
        .as_f64()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

pub(crate) fn calories(meal: &Value) -> Option<f64> {
    number(meal, CALORIE_KEYS)
}

pub(crate) fn protein(meal: &Value) -> Option<f64> {
    number(meal, PROTEIN_KEYS)
}

pub(crate) fn carbs(meal: &Value) -> Option<f64> {
    number(meal, CARB_KEYS)
}

pub(crate) fn fat(meal: &Value) -> Option<f64> {
    number(meal, FAT_KEYS)
}

pub(crate) fn ingredients(meal: &Value) -> Option<Vec<&str>> {
    meal.get("ingredients")?
        .as_array()?
        .iter()
        .map(Value::as_str)
        .collect()
}

/// Lowercased name, description and ingredients, for term matching.
pub(crate) fn searchable_text(meal: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(name) = name(meal) {
        parts.push(name.to_lowercase());
    }
    if let Some(description) = meal.get("description").and_then(Value::as_str) {
        parts.push(description.to_lowercase());
    }
    if let Some(items) = meal.get("ingredients").and_then(Value::as_array) {
        parts.extend(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase),
        );
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_snake_and_camel_case_keys() {
        let meal = serde_json::json!({
            "dayOfWeek": "MONDAY",
            "mealType": "Lunch",
            "protein": 20,
            "carbs_g": 30.5,
        });
        assert_eq!(day(&meal), Some(DayOfWeek::Monday));
        assert_eq!(meal_type(&meal), Some(MealType::Lunch));
        assert_eq!(protein(&meal), Some(20.0));
        assert_eq!(carbs(&meal), Some(30.5));
        assert_eq!(fat(&meal), None);
    }

    #[test]
    fn rejects_negative_numbers_and_mixed_ingredient_arrays() {
        let meal = serde_json::json!({ "calories": -5, "ingredients": ["a", 1] });
        assert_eq!(calories(&meal), None);
        assert_eq!(ingredients(&meal), None);
    }
}
