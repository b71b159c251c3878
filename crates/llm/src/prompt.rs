use std::fmt::Write as _;

use shared::{domain::MealType, nutrition::NutritionTargets};

use crate::DayRequest;

/// Caps how many earlier meal names are quoted back to the model.
const MAX_PREVIOUS_MEALS: usize = 21;

pub fn system_prompt() -> &'static str {
    "You are a registered dietitian who writes practical weekly meal plans. \
     Reply with a single JSON object of the form {\"meals\": [...]} and nothing else. \
     Each meal object has the keys meal_type (one of breakfast, lunch, dinner, snack), \
     name, description, ingredients (array of strings), calories, protein_g, carbs_g, \
     fat_g (numbers) and instructions. Return exactly one meal per meal type."
}

pub fn user_prompt(request: &DayRequest) -> String {
    let mut prompt = String::new();
    let targets = request.targets;
    let _ = writeln!(
        prompt,
        "Plan {} for a person whose goal is {}.",
        request.day.label(),
        request.goal.as_str().replace('_', " ")
    );
    let _ = writeln!(
        prompt,
        "Daily targets: {} kcal, {} g protein, {} g carbohydrates, {} g fat.",
        targets.calories, targets.protein_g, targets.carbs_g, targets.fat_g
    );
    for meal_type in MealType::ALL {
        let _ = writeln!(prompt, "{}", meal_line(meal_type, &targets));
    }

    if request.forbidden_ingredients.is_empty() {
        let _ = writeln!(prompt, "There are no forbidden ingredients.");
    } else {
        let _ = writeln!(
            prompt,
            "Never use these ingredients or anything containing them: {}.",
            request.forbidden_ingredients.join(", ")
        );
    }

    if let Some(preferences) = request
        .preferences
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let _ = writeln!(prompt, "Preferences: {preferences}");
    }

    if !request.previous_meal_names.is_empty() {
        let start = request
            .previous_meal_names
            .len()
            .saturating_sub(MAX_PREVIOUS_MEALS);
        let _ = writeln!(
            prompt,
            "Do not repeat these meals from earlier in the week: {}.",
            request.previous_meal_names[start..].join(", ")
        );
    }
    prompt
}

fn meal_line(meal_type: MealType, day: &NutritionTargets) -> String {
    let target = day.for_meal(meal_type);
    format!(
        "- {}: about {} kcal ({} g protein, {} g carbohydrates, {} g fat)",
        meal_type.label(),
        target.calories,
        target.protein_g,
        target.carbs_g,
        target.fat_g
    )
}
