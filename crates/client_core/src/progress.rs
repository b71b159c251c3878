use shared::{
    domain::{DayOfWeek, DietPlan, MealDraft},
    protocol::{percent_complete, StreamEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationStatus {
    #[default]
    Idle,
    Generating,
    Complete,
    Failed,
}

/// Running view of a streamed generation, folded from its events.
#[derive(Debug, Clone, Default)]
pub struct GenerationProgress {
    pub status: GenerationStatus,
    pub generation_id: Option<String>,
    pub percent: u8,
    pub current_day: Option<DayOfWeek>,
    pub days_completed: u32,
    pub total_days: u32,
    pub target_calories: u32,
    pub message: String,
    pub meals: Vec<MealDraft>,
    pub plan: Option<DietPlan>,
    pub error: Option<String>,
}

impl GenerationProgress {
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Start {
                generation_id,
                total_days,
                target_calories,
            } => {
                *self = Self {
                    status: GenerationStatus::Generating,
                    generation_id: Some(generation_id.clone()),
                    total_days: *total_days,
                    target_calories: *target_calories,
                    message: "Starting generation".into(),
                    ..Self::default()
                };
            }
            StreamEvent::Progress {
                day,
                days_completed,
                total_days,
                percent,
                message,
            } => {
                self.current_day = Some(*day);
                self.days_completed = *days_completed;
                self.total_days = *total_days;
                self.percent = *percent;
                self.message = message.clone();
            }
            StreamEvent::MealStreaming { meal, .. } => self.meals.push(meal.clone()),
            StreamEvent::DayComplete {
                day,
                days_completed,
                meals,
            } => {
                // Authoritative for the day, even if some meal events were missed.
                self.meals.retain(|meal| meal.day != *day);
                self.meals.extend(meals.iter().cloned());
                self.days_completed = *days_completed;
                self.percent = percent_complete(*days_completed, self.total_days);
                self.message = format!("{} ready", day.label());
            }
            StreamEvent::PlanComplete { plan } => {
                self.status = GenerationStatus::Complete;
                self.percent = 100;
                self.days_completed = self.total_days;
                self.meals = plan.meals.clone();
                self.plan = Some(plan.clone());
                self.message = "Plan complete".into();
            }
            StreamEvent::Error { message } => {
                self.status = GenerationStatus::Failed;
                self.error = Some(message.clone());
                self.message = message.clone();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            GenerationStatus::Complete | GenerationStatus::Failed
        )
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::MealType;

    use super::*;

    fn meal(day: DayOfWeek, meal_type: MealType) -> MealDraft {
        MealDraft {
            day,
            meal_type,
            name: format!("{day} {meal_type}"),
            description: String::new(),
            ingredients: Vec::new(),
            calories: 400.0,
            protein_g: 25.0,
            carbs_g: 50.0,
            fat_g: 11.0,
            instructions: String::new(),
        }
    }

    #[test]
    fn folds_a_day_of_events() {
        let mut progress = GenerationProgress::default();
        progress.apply(&StreamEvent::Start {
            generation_id: "g-1".into(),
            total_days: 7,
            target_calories: 1800,
        });
        assert_eq!(progress.status, GenerationStatus::Generating);

        progress.apply(&StreamEvent::Progress {
            day: DayOfWeek::Monday,
            days_completed: 0,
            total_days: 7,
            percent: 0,
            message: "Generating meals for Monday".into(),
        });
        progress.apply(&StreamEvent::MealStreaming {
            day: DayOfWeek::Monday,
            meal: meal(DayOfWeek::Monday, MealType::Breakfast),
        });
        assert_eq!(progress.meals.len(), 1);
        assert_eq!(progress.current_day, Some(DayOfWeek::Monday));

        let day_meals: Vec<MealDraft> = MealType::ALL
            .into_iter()
            .map(|t| meal(DayOfWeek::Monday, t))
            .collect();
        progress.apply(&StreamEvent::DayComplete {
            day: DayOfWeek::Monday,
            days_completed: 1,
            meals: day_meals,
        });
        assert_eq!(progress.meals.len(), 4);
        assert_eq!(progress.percent, 14);
        assert!(!progress.is_finished());
    }

    #[test]
    fn error_marks_failure() {
        let mut progress = GenerationProgress::default();
        progress.apply(&StreamEvent::Error {
            message: "model unavailable".into(),
        });
        assert_eq!(progress.status, GenerationStatus::Failed);
        assert_eq!(progress.error.as_deref(), Some("model unavailable"));
        assert!(progress.is_finished());
    }
}
