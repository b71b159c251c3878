//! Renderers for downloading a saved plan.

mod csv;
mod pdf;

pub use self::csv::render_csv;
pub use self::pdf::render_pdf;

use shared::domain::DietPlan;

#[derive(Debug, Clone)]
pub struct PdfExport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

/// `My Plan!` -> `my-plan`, falling back to `diet-plan` when nothing is left.
pub fn file_stem(plan: &DietPlan) -> String {
    let mut stem = String::with_capacity(plan.name.len());
    for c in plan.name.chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
        } else if !stem.is_empty() && !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_end_matches('-');
    if stem.is_empty() {
        "diet-plan".to_string()
    } else {
        stem.to_string()
    }
}
