use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{DayOfWeek, DietPlan, DietPlanId, MealDraft, MealType, UserId, UserProfile},
    protocol::ProfileUpdate,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub profile: UserProfile,
    pub password_hash: String,
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, age, sex, height_cm, \
     weight_kg, goal, activity_level, dietary_restrictions, allergies, created_at";

const PLAN_COLUMNS: &str = "id, user_id, name, week_start, week_end, target_calories, created_at";

const MEAL_COLUMNS: &str = "diet_plan_id, day, meal_type, name, description, ingredients, \
     calories, protein_g, carbs_g, fat_g, instructions";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, user: NewUser<'_>) -> Result<UserId> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(user.email.trim())
        .bind(user.password_hash)
        .bind(user.first_name.trim())
        .bind(user.last_name.trim())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert user '{}'", user.email))?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| stored_user_from_row(&r)).transpose()
    }

    pub async fn user_by_id(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| stored_user_from_row(&r)).transpose()
    }

    /// Applies the present fields of `update`; returns false for unknown users.
    pub async fn update_profile(&self, user_id: UserId, update: &ProfileUpdate) -> Result<bool> {
        let restrictions = update
            .dietary_restrictions
            .as_ref()
            .map(|list| serde_json::to_string(&clean_list(list)))
            .transpose()?;
        let allergies = update
            .allergies
            .as_ref()
            .map(|list| serde_json::to_string(&clean_list(list)))
            .transpose()?;

        let result = sqlx::query(
            "UPDATE users SET
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                age = COALESCE(?, age),
                sex = COALESCE(?, sex),
                height_cm = COALESCE(?, height_cm),
                weight_kg = COALESCE(?, weight_kg),
                goal = COALESCE(?, goal),
                activity_level = COALESCE(?, activity_level),
                dietary_restrictions = COALESCE(?, dietary_restrictions),
                allergies = COALESCE(?, allergies),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(update.first_name.as_deref().map(str::trim))
        .bind(update.last_name.as_deref().map(str::trim))
        .bind(update.age.map(i64::from))
        .bind(update.sex.map(|sex| sex.as_str()))
        .bind(update.height_cm)
        .bind(update.weight_kg)
        .bind(update.goal.map(|goal| goal.as_str()))
        .bind(update.activity_level.map(|level| level.as_str()))
        .bind(restrictions)
        .bind(allergies)
        .bind(Utc::now())
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(user_id.0)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_user(&self, user_id: UserId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM meals WHERE diet_plan_id IN (SELECT id FROM diet_plans WHERE user_id = ?)",
        )
        .bind(user_id.0)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM diet_plans WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persists the plan and its meals in one transaction.
    pub async fn insert_diet_plan(&self, plan: &DietPlan) -> Result<DietPlanId> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO diet_plans (user_id, name, week_start, week_end, target_calories, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(plan.user_id.0)
        .bind(&plan.name)
        .bind(plan.week_start)
        .bind(plan.week_end)
        .bind(i64::from(plan.target_calories))
        .bind(plan.created_at)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert diet plan")?;
        let diet_plan_id = DietPlanId(rec.get::<i64, _>(0));

        for meal in &plan.meals {
            sqlx::query(
                "INSERT INTO meals (diet_plan_id, day, day_index, meal_type, meal_index, name, description, ingredients, calories, protein_g, carbs_g, fat_g, instructions)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(diet_plan_id.0)
            .bind(meal.day.as_str())
            .bind(i64::from(meal.day.offset()))
            .bind(meal.meal_type.as_str())
            .bind(meal_index(meal.meal_type))
            .bind(&meal.name)
            .bind(&meal.description)
            .bind(serde_json::to_string(&meal.ingredients)?)
            .bind(meal.calories)
            .bind(meal.protein_g)
            .bind(meal.carbs_g)
            .bind(meal.fat_g)
            .bind(&meal.instructions)
            .execute(&mut *tx)
            .await
            .context("failed to insert meal")?;
        }

        tx.commit().await?;
        Ok(diet_plan_id)
    }

    /// All plans owned by `user_id`, newest first, with meals attached.
    pub async fn list_diet_plans(&self, user_id: UserId) -> Result<Vec<DietPlan>> {
        let plan_rows = sqlx::query(&format!(
            "SELECT {PLAN_COLUMNS} FROM diet_plans WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        let mut plans = plan_rows
            .iter()
            .map(plan_from_row)
            .collect::<Result<Vec<_>>>()?;
        if plans.is_empty() {
            return Ok(plans);
        }

        let meal_rows = sqlx::query(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals
             WHERE diet_plan_id IN (SELECT id FROM diet_plans WHERE user_id = ?)
             ORDER BY diet_plan_id, day_index, meal_index, id"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        for row in &meal_rows {
            let plan_id = DietPlanId(row.get::<i64, _>(0));
            let meal = meal_from_row(row)?;
            if let Some(plan) = plans
                .iter_mut()
                .find(|plan| plan.diet_plan_id == Some(plan_id))
            {
                plan.meals.push(meal);
            }
        }
        Ok(plans)
    }

    pub async fn load_diet_plan(&self, diet_plan_id: DietPlanId) -> Result<Option<DietPlan>> {
        let row = sqlx::query(&format!("SELECT {PLAN_COLUMNS} FROM diet_plans WHERE id = ?"))
            .bind(diet_plan_id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut plan = plan_from_row(&row)?;

        let meal_rows = sqlx::query(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE diet_plan_id = ? ORDER BY day_index, meal_index, id"
        ))
        .bind(diet_plan_id.0)
        .fetch_all(&self.pool)
        .await?;
        plan.meals = meal_rows
            .iter()
            .map(meal_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(plan))
    }

    pub async fn rename_diet_plan(
        &self,
        user_id: UserId,
        diet_plan_id: DietPlanId,
        name: &str,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE diet_plans SET name = ? WHERE id = ? AND user_id = ?")
            .bind(name.trim())
            .bind(diet_plan_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_diet_plan(&self, user_id: UserId, diet_plan_id: DietPlanId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM diet_plans WHERE id = ? AND user_id = ?")
            .bind(diet_plan_id.0)
            .bind(user_id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("DELETE FROM meals WHERE diet_plan_id = ?")
            .bind(diet_plan_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

/// True when `error` came from a UNIQUE constraint, e.g. a second account
/// for an email that already exists.
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .and_then(sqlx::Error::as_database_error)
        .is_some_and(|db| db.is_unique_violation())
}

fn meal_index(meal_type: MealType) -> i64 {
    MealType::ALL
        .iter()
        .position(|candidate| *candidate == meal_type)
        .map(|index| index as i64)
        .unwrap_or_default()
}

fn clean_list(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn parse_optional<T: FromStr>(row: &SqliteRow, column: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    row.get::<Option<String>, _>(column)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow!("invalid {column} '{raw}': {e}"))
        })
        .transpose()
}

fn stored_user_from_row(row: &SqliteRow) -> Result<StoredUser> {
    let dietary_restrictions: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("dietary_restrictions"))
            .context("invalid dietary_restrictions column")?;
    let allergies: Vec<String> = serde_json::from_str(&row.get::<String, _>("allergies"))
        .context("invalid allergies column")?;
    let age = row
        .get::<Option<i64>, _>("age")
        .map(u32::try_from)
        .transpose()
        .context("invalid age column")?;

    Ok(StoredUser {
        password_hash: row.get::<String, _>("password_hash"),
        profile: UserProfile {
            user_id: UserId(row.get::<i64, _>("id")),
            email: row.get::<String, _>("email"),
            first_name: row.get::<String, _>("first_name"),
            last_name: row.get::<String, _>("last_name"),
            age,
            sex: parse_optional(row, "sex")?,
            height_cm: row.get::<Option<f64>, _>("height_cm"),
            weight_kg: row.get::<Option<f64>, _>("weight_kg"),
            goal: parse_optional(row, "goal")?,
            activity_level: parse_optional(row, "activity_level")?,
            dietary_restrictions,
            allergies,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        },
    })
}

fn plan_from_row(row: &SqliteRow) -> Result<DietPlan> {
    Ok(DietPlan {
        diet_plan_id: Some(DietPlanId(row.get::<i64, _>("id"))),
        user_id: UserId(row.get::<i64, _>("user_id")),
        name: row.get::<String, _>("name"),
        week_start: row.get::<NaiveDate, _>("week_start"),
        week_end: row.get::<NaiveDate, _>("week_end"),
        target_calories: u32::try_from(row.get::<i64, _>("target_calories"))
            .context("invalid target_calories column")?,
        meals: Vec::new(),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

fn meal_from_row(row: &SqliteRow) -> Result<MealDraft> {
    let day = row
        .get::<String, _>("day")
        .parse::<DayOfWeek>()
        .map_err(|e| anyhow!(e))?;
    let meal_type = row
        .get::<String, _>("meal_type")
        .parse::<MealType>()
        .map_err(|e| anyhow!(e))?;
    Ok(MealDraft {
        day,
        meal_type,
        name: row.get::<String, _>("name"),
        description: row.get::<String, _>("description"),
        ingredients: serde_json::from_str(&row.get::<String, _>("ingredients"))
            .context("invalid ingredients column")?,
        calories: row.get::<f64, _>("calories"),
        protein_g: row.get::<f64, _>("protein_g"),
        carbs_g: row.get::<f64, _>("carbs_g"),
        fat_g: row.get::<f64, _>("fat_g"),
        instructions: row.get::<String, _>("instructions"),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
