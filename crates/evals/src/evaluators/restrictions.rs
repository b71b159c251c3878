use serde_json::Value;

use crate::{fields, EvalContext, EvalResult};

/// Penalizes meals whose name, description or ingredients mention a
/// forbidden term.
pub fn evaluate_forbidden_ingredients(meals: &[Value], ctx: &EvalContext) -> EvalResult {
    let terms: Vec<String> = ctx
        .forbidden_ingredients
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
        .collect();
    if terms.is_empty() {
        return EvalResult::new("forbidden_ingredients", 1.0, "no restrictions");
    }
    if meals.is_empty() {
        return EvalResult::new("forbidden_ingredients", 1.0, "no meals");
    }

    let mut offenders = Vec::new();
    for meal in meals {
        let text = fields::searchable_text(meal);
        if let Some(term) = terms.iter().find(|term| text.contains(term.as_str())) {
            let name = fields::name(meal).unwrap_or("unnamed meal");
            offenders.push(format!("{name} ({term})"));
        }
    }
    if offenders.is_empty() {
        return EvalResult::new("forbidden_ingredients", 1.0, "no violations");
    }
    EvalResult::new(
        "forbidden_ingredients",
        1.0 - offenders.len() as f64 / meals.len() as f64,
        format!("violations: {}", offenders.join("; ")),
    )
}
