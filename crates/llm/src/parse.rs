use serde::Deserialize;
use serde_json::Value;
use shared::domain::{DayOfWeek, MealDraft, MealType};

use crate::LlmError;

#[derive(Debug, Deserialize)]
struct RawMeal {
    meal_type: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    ingredients: Vec<String>,
    #[serde(default)]
    calories: f64,
    #[serde(default)]
    protein_g: f64,
    #[serde(default)]
    carbs_g: f64,
    #[serde(default)]
    fat_g: f64,
    #[serde(default)]
    instructions: String,
}

/// Turns the model's reply for one day into meal drafts stamped with `day`.
///
/// Accepts `{"meals": [...]}` or a bare array, optionally wrapped in a
/// markdown code fence. Every meal type must appear exactly once.
pub fn parse_day_response(day: DayOfWeek, content: &str) -> Result<Vec<MealDraft>, LlmError> {
    let body = strip_code_fence(content);
    let value: Value = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("reply is not JSON: {e}")))?;
    let meals = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("meals") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LlmError::InvalidResponse(
                    "reply has no meals array".into(),
                ))
            }
        },
        _ => {
            return Err(LlmError::InvalidResponse(
                "reply is neither an object nor an array".into(),
            ))
        }
    };

    let mut drafts = Vec::with_capacity(meals.len());
    for item in meals {
        let raw: RawMeal = serde_json::from_value(item)?;
        let meal_type = raw
            .meal_type
            .parse::<MealType>()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        if drafts.iter().any(|d: &MealDraft| d.meal_type == meal_type) {
            return Err(LlmError::InvalidResponse(format!(
                "duplicate {meal_type} for {day}"
            )));
        }
        let name = raw.name.trim();
        if name.is_empty() {
            return Err(LlmError::InvalidResponse(format!(
                "{meal_type} for {day} has no name"
            )));
        }
        drafts.push(MealDraft {
            day,
            meal_type,
            name: name.to_string(),
            description: raw.description.trim().to_string(),
            ingredients: raw
                .ingredients
                .into_iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect(),
            calories: non_negative(raw.calories),
            protein_g: non_negative(raw.protein_g),
            carbs_g: non_negative(raw.carbs_g),
            fat_g: non_negative(raw.fat_g),
            instructions: raw.instructions.trim().to_string(),
        });
    }

    if let Some(missing) = MealType::ALL
        .iter()
        .find(|meal_type| !drafts.iter().any(|d| d.meal_type == **meal_type))
    {
        return Err(LlmError::InvalidResponse(format!(
            "missing {missing} for {day}"
        )));
    }

    drafts.sort_by_key(|d| d.meal_type);
    Ok(drafts)
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meal_json(meal_type: &str) -> Value {
        serde_json::json!({
            "meal_type": meal_type,
            "name": format!(" {meal_type} dish "),
            "ingredients": ["rice", " ", "beans"],
            "calories": 500,
            "protein_g": 25.5,
            "carbs_g": 60,
            "fat_g": -3,
        })
    }

    fn full_day() -> Value {
        Value::Array(
            ["snack", "dinner", "lunch", "breakfast"]
                .iter()
                .map(|t| meal_json(t))
                .collect(),
        )
    }

    #[test]
    fn parses_wrapped_object_and_orders_by_meal_type() {
        let reply = serde_json::json!({ "meals": full_day() }).to_string();
        let meals = parse_day_response(DayOfWeek::Friday, &reply).expect("meals");
        assert_eq!(meals.len(), 4);
        assert_eq!(meals[0].meal_type, MealType::Breakfast);
        assert_eq!(meals[3].meal_type, MealType::Snack);
        assert!(meals.iter().all(|m| m.day == DayOfWeek::Friday));
        assert_eq!(meals[0].name, "breakfast dish");
        assert_eq!(meals[0].ingredients, vec!["rice", "beans"]);
        assert_eq!(meals[0].fat_g, 0.0);
    }

    #[test]
    fn accepts_fenced_bare_array() {
        let reply = format!("```json\n{}\n```", full_day());
        let meals = parse_day_response(DayOfWeek::Monday, &reply).expect("meals");
        assert_eq!(meals.len(), 4);
    }

    #[test]
    fn rejects_missing_meal_type() {
        let reply = serde_json::json!([
            meal_json("breakfast"),
            meal_json("lunch"),
            meal_json("dinner"),
        ])
        .to_string();
        let err = parse_day_response(DayOfWeek::Monday, &reply).expect_err("should fail");
        assert!(err.to_string().contains("missing snack"));
    }

    #[test]
    fn rejects_duplicates_and_prose() {
        let reply = serde_json::json!([meal_json("lunch"), meal_json("lunch")]).to_string();
        assert!(parse_day_response(DayOfWeek::Monday, &reply).is_err());
        assert!(parse_day_response(DayOfWeek::Monday, "Here is your plan!").is_err());
    }
}
