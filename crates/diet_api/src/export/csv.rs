use anyhow::{anyhow, Result};
use serde::Serialize;
use shared::domain::DietPlan;

#[derive(Serialize)]
struct CsvRow<'a> {
    day: &'a str,
    date: String,
    meal_type: &'a str,
    name: &'a str,
    calories: f64,
    protein_g: f64,
    carbs_g: f64,
    fat_g: f64,
    ingredients: String,
    description: &'a str,
}

/// One row per meal, with a header row, in day then meal-type order.
pub fn render_csv(plan: &DietPlan) -> Result<String> {
    let mut meals: Vec<_> = plan.meals.iter().collect();
    meals.sort_by_key(|meal| (meal.day, meal.meal_type));

    let mut writer = csv::Writer::from_writer(Vec::new());
    for meal in meals {
        writer.serialize(CsvRow {
            day: meal.day.label(),
            date: plan.date_of(meal.day).to_string(),
            meal_type: meal.meal_type.label(),
            name: &meal.name,
            calories: meal.calories.round(),
            protein_g: meal.protein_g.round(),
            carbs_g: meal.carbs_g.round(),
            fat_g: meal.fat_g.round(),
            ingredients: meal.ingredients.join("; "),
            description: &meal.description,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("failed to flush csv: {e}"))?;
    Ok(String::from_utf8(bytes)?)
}
