use serde::{Deserialize, Serialize};

use crate::protocol::{ProfileUpdate, RegisterRequest};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_LIST_ENTRIES: usize = 20;
pub const MAX_LIST_ENTRY_LEN: usize = 60;

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("email is required".into());
    }
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err("email is invalid".into());
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err("email is invalid".into());
    };
    if local.is_empty() || domain.contains('@') {
        return Err("email is invalid".into());
    }
    let valid_domain = domain
        .split('.')
        .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
        && domain.contains('.');
    if !valid_domain {
        return Err("email is invalid".into());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err("password is too long".into());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("password must contain an uppercase letter".into());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("password must contain a lowercase letter".into());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("password must contain a digit".into());
    }
    Ok(())
}

pub fn validate_name(field: &str, value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{field} is required"));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(format!("{field} must be at most {MAX_NAME_LEN} characters"));
    }
    Ok(())
}

fn validate_list(field: &str, entries: &[String]) -> Result<(), String> {
    if entries.len() > MAX_LIST_ENTRIES {
        return Err(format!("{field} accepts at most {MAX_LIST_ENTRIES} entries"));
    }
    if entries
        .iter()
        .any(|entry| entry.trim().chars().count() > MAX_LIST_ENTRY_LEN)
    {
        return Err(format!(
            "{field} entries must be at most {MAX_LIST_ENTRY_LEN} characters"
        ));
    }
    Ok(())
}

pub fn validate_profile(update: &ProfileUpdate) -> Result<(), String> {
    if let Some(first_name) = &update.first_name {
        validate_name("first name", first_name)?;
    }
    if let Some(last_name) = &update.last_name {
        validate_name("last name", last_name)?;
    }
    if let Some(age) = update.age {
        if !(13..=120).contains(&age) {
            return Err("age must be between 13 and 120".into());
        }
    }
    if let Some(height) = update.height_cm {
        if !(100.0..=250.0).contains(&height) {
            return Err("height must be between 100 and 250 cm".into());
        }
    }
    if let Some(weight) = update.weight_kg {
        if !(30.0..=300.0).contains(&weight) {
            return Err("weight must be between 30 and 300 kg".into());
        }
    }
    if let Some(restrictions) = &update.dietary_restrictions {
        validate_list("dietary restrictions", restrictions)?;
    }
    if let Some(allergies) = &update.allergies {
        validate_list("allergies", allergies)?;
    }
    Ok(())
}

pub fn validate_registration(request: &RegisterRequest) -> Result<(), String> {
    validate_email(&request.email)?;
    validate_password(&request.password)?;
    validate_name("first name", &request.first_name)?;
    validate_name("last name", &request.last_name)?;
    if let Some(profile) = &request.profile {
        validate_profile(profile)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthLabel {
    VeryWeak,
    Weak,
    Fair,
    Good,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStrength {
    pub score: u8,
    pub label: StrengthLabel,
}

/// Scores a password 0..=4: one point each for length >= 8, mixed case,
/// digits and symbols, with a bonus for length >= 12 capped at 4.
pub fn password_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    let mixed_case = password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    let mut score: u8 = 0;
    if len >= MIN_PASSWORD_LEN {
        score += 1;
        if len >= 12 {
            score += 1;
        }
    }
    score += u8::from(mixed_case) + u8::from(digit) + u8::from(symbol);
    if len < MIN_PASSWORD_LEN {
        score = score.min(1);
    }
    let score = score.min(4);

    let label = match score {
        0 => StrengthLabel::VeryWeak,
        1 => StrengthLabel::Weak,
        2 => StrengthLabel::Fair,
        3 => StrengthLabel::Good,
        _ => StrengthLabel::Strong,
    };
    PasswordStrength { score, label }
}
