mod nutrition;
mod restrictions;
mod structure;

pub use nutrition::{evaluate_calorie_target, evaluate_macro_consistency, evaluate_macro_ratios};
pub use restrictions::evaluate_forbidden_ingredients;
pub use structure::{
    evaluate_day_coverage, evaluate_meal_count, evaluate_meal_structure, evaluate_required_fields,
    evaluate_variety,
};
