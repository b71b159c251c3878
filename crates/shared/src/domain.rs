use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(DietPlanId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Generates `as_str`, `Display` and `FromStr` for a snake_case enum so the
/// storage layer and the wire format agree on one spelling.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    WeightLoss,
    Maintenance,
    MuscleGain,
}

string_enum!(Goal, "goal", {
    WeightLoss => "weight_loss",
    Maintenance => "maintenance",
    MuscleGain => "muscle_gain",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtraActive,
}

string_enum!(ActivityLevel, "activity level", {
    Sedentary => "sedentary",
    LightlyActive => "lightly_active",
    ModeratelyActive => "moderately_active",
    VeryActive => "very_active",
    ExtraActive => "extra_active",
});

impl ActivityLevel {
    /// Multiplier applied to basal metabolic rate to estimate daily expenditure.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::LightlyActive => 1.375,
            Self::ModeratelyActive => 1.55,
            Self::VeryActive => 1.725,
            Self::ExtraActive => 1.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

string_enum!(Sex, "sex", {
    Male => "male",
    Female => "female",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

string_enum!(DayOfWeek, "day of week", {
    Monday => "monday",
    Tuesday => "tuesday",
    Wednesday => "wednesday",
    Thursday => "thursday",
    Friday => "friday",
    Saturday => "saturday",
    Sunday => "sunday",
});

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Zero-based offset from Monday.
    pub fn offset(self) -> u32 {
        match self {
            Self::Monday => 0,
            Self::Tuesday => 1,
            Self::Wednesday => 2,
            Self::Thursday => 3,
            Self::Friday => 4,
            Self::Saturday => 5,
            Self::Sunday => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

string_enum!(MealType, "meal type", {
    Breakfast => "breakfast",
    Lunch => "lunch",
    Dinner => "dinner",
    Snack => "snack",
});

impl MealType {
    pub const ALL: [MealType; 4] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Snack,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
            Self::Snack => "Snack",
        }
    }
}

/// Number of meals in a complete weekly plan.
pub const MEALS_PER_WEEK: usize = DayOfWeek::ALL.len() * MealType::ALL.len();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<Goal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Allergies and the ingredients excluded by each dietary restriction,
    /// lowercased and deduplicated.
    pub fn forbidden_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = self
            .allergies
            .iter()
            .map(|term| term.trim().to_lowercase())
            .chain(
                self.dietary_restrictions
                    .iter()
                    .flat_map(|restriction| restriction_terms(restriction)),
            )
            .filter(|term| !term.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        terms
    }
}

const MEAT: &[&str] = &[
    "beef", "pork", "chicken", "turkey", "lamb", "bacon", "ham", "sausage", "veal", "duck",
];
const SEAFOOD: &[&str] = &["fish", "salmon", "tuna", "shrimp", "prawn", "cod", "crab"];
const DAIRY: &[&str] = &["milk", "cheese", "butter", "cream", "yogurt", "yoghurt"];
const GLUTEN: &[&str] = &["wheat", "barley", "rye", "bread", "pasta", "couscous"];
const ANIMAL_BYPRODUCTS: &[&str] = &["egg", "honey"];
const PORK: &[&str] = &["pork", "bacon", "ham"];
const NUTS: &[&str] = &["peanut", "almond", "cashew", "walnut", "pecan", "hazelnut"];

/// Expands a dietary restriction into ingredient terms. Unknown restrictions
/// are taken literally, minus a leading "no ".
pub fn restriction_terms(restriction: &str) -> Vec<String> {
    let normalized = restriction.trim().to_lowercase().replace(['-', '_'], " ");
    let groups: Vec<&[&str]> = match normalized.as_str() {
        "vegetarian" => vec![MEAT, SEAFOOD],
        "vegan" => vec![MEAT, SEAFOOD, DAIRY, ANIMAL_BYPRODUCTS],
        "pescatarian" => vec![MEAT],
        "dairy free" | "lactose free" | "lactose intolerant" => vec![DAIRY],
        "gluten free" | "celiac" | "coeliac" => vec![GLUTEN],
        "halal" | "kosher" => vec![PORK],
        "nut free" => vec![NUTS],
        _ => {
            let literal = normalized.strip_prefix("no ").unwrap_or(&normalized);
            return vec![literal.trim().to_string()];
        }
    };
    groups
        .into_iter()
        .flatten()
        .map(|term| (*term).to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealDraft {
    pub day: DayOfWeek,
    pub meal_type: MealType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diet_plan_id: Option<DietPlanId>,
    pub user_id: UserId,
    pub name: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub target_calories: u32,
    pub meals: Vec<MealDraft>,
    pub created_at: DateTime<Utc>,
}

impl DietPlan {
    pub fn meals_for_day(&self, day: DayOfWeek) -> impl Iterator<Item = &MealDraft> {
        self.meals.iter().filter(move |meal| meal.day == day)
    }

    pub fn date_of(&self, day: DayOfWeek) -> NaiveDate {
        self.week_start + chrono::Duration::days(i64::from(day.offset()))
    }

    /// Orders meals by day, then by meal type.
    pub fn sort_meals(&mut self) {
        self.meals.sort_by_key(|meal| (meal.day, meal.meal_type));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_their_storage_spelling() {
        for day in DayOfWeek::ALL {
            assert_eq!(day.as_str().parse::<DayOfWeek>(), Ok(day));
        }
        assert_eq!("Lightly_Active".parse(), Ok(ActivityLevel::LightlyActive));
        assert!("brunch".parse::<MealType>().is_err());
    }

    #[test]
    fn a_full_week_has_twenty_eight_meals() {
        assert_eq!(MEALS_PER_WEEK, 28);
    }

    #[test]
    fn forbidden_terms_merge_allergies_and_restrictions() {
        let profile = UserProfile {
            user_id: UserId(1),
            email: "a@b.co".into(),
            first_name: "A".into(),
            last_name: "B".into(),
            age: None,
            sex: None,
            height_cm: None,
            weight_kg: None,
            goal: None,
            activity_level: None,
            dietary_restrictions: vec!["No Pork".into(), " ".into()],
            allergies: vec!["Peanut".into(), "pork".into()],
            created_at: Utc::now(),
        };
        assert_eq!(profile.forbidden_terms(), vec!["peanut", "pork"]);
    }

    #[test]
    fn known_diets_expand_to_ingredients() {
        let vegan = restriction_terms("Vegan");
        assert!(vegan.contains(&"cheese".to_string()));
        assert!(vegan.contains(&"chicken".to_string()));
        assert_eq!(restriction_terms("gluten-free"), restriction_terms("Gluten Free"));
        assert_eq!(restriction_terms("no mushrooms"), vec!["mushrooms"]);
    }
}
