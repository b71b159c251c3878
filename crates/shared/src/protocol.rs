use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ActivityLevel, DayOfWeek, DietPlan, DietPlanId, Goal, MealDraft, Sex, UserProfile,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateDietPlanRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any date inside the target week; defaults to next Monday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_start: Option<NaiveDate>,
    /// Free-text cuisine or taste preferences passed to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_calories: Option<u32>,
    #[serde(default = "default_save")]
    pub save: bool,
}

fn default_save() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameDietPlanRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfResponse {
    pub diet_plan_id: DietPlanId,
    pub filename: String,
    pub pdf_b64: String,
}

/// Payload of one `data:` line on the diet-plan generation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        generation_id: String,
        total_days: u32,
        target_calories: u32,
    },
    Progress {
        day: DayOfWeek,
        days_completed: u32,
        total_days: u32,
        percent: u8,
        message: String,
    },
    MealStreaming {
        day: DayOfWeek,
        meal: MealDraft,
    },
    DayComplete {
        day: DayOfWeek,
        days_completed: u32,
        meals: Vec<MealDraft>,
    },
    PlanComplete {
        plan: DietPlan,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::MealStreaming { .. } => "meal_streaming",
            Self::DayComplete { .. } => "day_complete",
            Self::PlanComplete { .. } => "plan_complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PlanComplete { .. } | Self::Error { .. })
    }
}

pub fn percent_complete(days_completed: u32, total_days: u32) -> u8 {
    if total_days == 0 {
        return 100;
    }
    let ratio = f64::from(days_completed.min(total_days)) / f64::from(total_days);
    (ratio * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_events_carry_their_kind_as_type_tag() {
        let event = StreamEvent::Progress {
            day: DayOfWeek::Tuesday,
            days_completed: 1,
            total_days: 7,
            percent: 14,
            message: "Generating Tuesday".into(),
        };
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["type"], "progress");
        assert_eq!(json["day"], "tuesday");
        assert_eq!(event.kind(), "progress");
    }

    #[test]
    fn generate_request_saves_by_default() {
        let request: GenerateDietPlanRequest = serde_json::from_str("{}").expect("json");
        assert!(request.save);
        assert!(request.week_start.is_none());
    }

    #[test]
    fn percent_handles_zero_days() {
        assert_eq!(percent_complete(0, 0), 100);
        assert_eq!(percent_complete(3, 7), 43);
        assert_eq!(percent_complete(9, 7), 100);
    }
}
