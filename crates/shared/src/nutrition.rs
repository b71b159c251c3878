//! Calorie and macronutrient targets derived from a user profile.

use serde::{Deserialize, Serialize};

use crate::domain::{Goal, MealType, Sex, UserProfile};

pub const DEFAULT_CALORIE_TARGET: u32 = 2000;
pub const MIN_CALORIE_TARGET: u32 = 1200;
pub const MACRO_TOLERANCE: f64 = 0.05;

pub const KCAL_PER_GRAM_PROTEIN: f64 = 4.0;
pub const KCAL_PER_GRAM_CARBS: f64 = 4.0;
pub const KCAL_PER_GRAM_FAT: f64 = 9.0;

/// Mifflin-St Jeor basal metabolic rate in kcal/day.
pub fn bmr(sex: Sex, weight_kg: f64, height_cm: f64, age: u32) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age);
    match sex {
        Sex::Male => base + 5.0,
        Sex::Female => base - 161.0,
    }
}

fn goal_adjustment(goal: Goal) -> f64 {
    match goal {
        Goal::WeightLoss => -500.0,
        Goal::Maintenance => 0.0,
        Goal::MuscleGain => 300.0,
    }
}

pub fn daily_calorie_target(profile: &UserProfile) -> u32 {
    let (Some(sex), Some(weight), Some(height), Some(age)) =
        (profile.sex, profile.weight_kg, profile.height_cm, profile.age)
    else {
        return DEFAULT_CALORIE_TARGET;
    };

    let activity = profile
        .activity_level
        .map(|level| level.multiplier())
        .unwrap_or(1.2);
    let goal = profile.goal.map(goal_adjustment).unwrap_or(0.0);
    let target = bmr(sex, weight, height, age) * activity + goal;
    if !target.is_finite() {
        return DEFAULT_CALORIE_TARGET;
    }
    (target.round().max(0.0) as u32).max(MIN_CALORIE_TARGET)
}

/// Fraction of daily calories expected from each macronutrient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroSplit {
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl MacroSplit {
    pub fn for_goal(goal: Goal) -> Self {
        match goal {
            Goal::WeightLoss => Self {
                protein: 0.30,
                carbs: 0.40,
                fat: 0.30,
            },
            Goal::Maintenance => Self {
                protein: 0.25,
                carbs: 0.50,
                fat: 0.25,
            },
            Goal::MuscleGain => Self {
                protein: 0.30,
                carbs: 0.45,
                fat: 0.25,
            },
        }
    }

    /// Inclusive acceptable range for a share, `MACRO_TOLERANCE` either side.
    pub fn range(share: f64) -> (f64, f64) {
        ((share - MACRO_TOLERANCE).max(0.0), (share + MACRO_TOLERANCE).min(1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionTargets {
    pub calories: u32,
    pub protein_g: u32,
    pub carbs_g: u32,
    pub fat_g: u32,
}

impl NutritionTargets {
    pub fn for_calories(calories: u32, goal: Goal) -> Self {
        let split = MacroSplit::for_goal(goal);
        let kcal = f64::from(calories);
        Self {
            calories,
            protein_g: (kcal * split.protein / KCAL_PER_GRAM_PROTEIN).round() as u32,
            carbs_g: (kcal * split.carbs / KCAL_PER_GRAM_CARBS).round() as u32,
            fat_g: (kcal * split.fat / KCAL_PER_GRAM_FAT).round() as u32,
        }
    }

    pub fn for_profile(profile: &UserProfile) -> Self {
        Self::for_calories(
            daily_calorie_target(profile),
            profile.goal.unwrap_or(Goal::Maintenance),
        )
    }

    pub fn for_meal(&self, meal_type: MealType) -> Self {
        let share = meal_share(meal_type);
        let scale = |value: u32| (f64::from(value) * share).round() as u32;
        Self {
            calories: scale(self.calories),
            protein_g: scale(self.protein_g),
            carbs_g: scale(self.carbs_g),
            fat_g: scale(self.fat_g),
        }
    }
}

pub fn meal_share(meal_type: MealType) -> f64 {
    match meal_type {
        MealType::Breakfast => 0.25,
        MealType::Lunch => 0.35,
        MealType::Dinner => 0.30,
        MealType::Snack => 0.10,
    }
}

pub fn calories_from_macros(protein_g: f64, carbs_g: f64, fat_g: f64) -> f64 {
    protein_g * KCAL_PER_GRAM_PROTEIN + carbs_g * KCAL_PER_GRAM_CARBS + fat_g * KCAL_PER_GRAM_FAT
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{ActivityLevel, UserId};

    fn profile() -> UserProfile {
        UserProfile {
            user_id: UserId(1),
            email: "sam@example.com".into(),
            first_name: "Sam".into(),
            last_name: "Lee".into(),
            age: Some(30),
            sex: Some(Sex::Male),
            height_cm: Some(180.0),
            weight_kg: Some(80.0),
            goal: Some(Goal::Maintenance),
            activity_level: Some(ActivityLevel::ModeratelyActive),
            dietary_restrictions: Vec::new(),
            allergies: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mifflin_st_jeor_matches_reference_values() {
        assert_eq!(bmr(Sex::Male, 80.0, 180.0, 30), 1780.0);
        assert_eq!(bmr(Sex::Female, 60.0, 165.0, 25), 1345.25);
    }

    #[test]
    fn calorie_target_applies_activity_and_goal() {
        let mut p = profile();
        assert_eq!(daily_calorie_target(&p), 2759);
        p.goal = Some(Goal::WeightLoss);
        assert_eq!(daily_calorie_target(&p), 2259);
    }

    #[test]
    fn incomplete_profile_falls_back_to_default() {
        let mut p = profile();
        p.age = None;
        assert_eq!(daily_calorie_target(&p), DEFAULT_CALORIE_TARGET);
    }

    #[test]
    fn calorie_target_never_drops_below_floor() {
        let mut p = profile();
        p.sex = Some(Sex::Female);
        p.weight_kg = Some(35.0);
        p.height_cm = Some(120.0);
        p.age = Some(90);
        p.goal = Some(Goal::WeightLoss);
        assert_eq!(daily_calorie_target(&p), MIN_CALORIE_TARGET);
    }

    #[test]
    fn targets_split_calories_into_grams() {
        let targets = NutritionTargets::for_calories(2000, Goal::Maintenance);
        assert_eq!(targets.protein_g, 125);
        assert_eq!(targets.carbs_g, 250);
        assert_eq!(targets.fat_g, 56);
        assert_eq!(targets.for_meal(MealType::Snack).calories, 200);
    }

    #[test]
    fn meal_shares_cover_the_whole_day() {
        let total: f64 = MealType::ALL.iter().map(|m| meal_share(*m)).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
