//! Input normalisation shared by the causes, products and users services.

use crate::error::{AppError, AppResult};

pub const MAX_TITLE_LEN: usize = 140;
pub const MAX_TEXT_LEN: usize = 5_000;
pub const MAX_TAGS: usize = 20;

/// Trimmed, non-empty text no longer than `max` characters.
pub fn required_text(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    optional_text(field, value, max)
}

pub fn optional_text(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

/// Lower-cased, trimmed, de-duplicated tags in first-seen order.
pub fn tags(raw: &[String]) -> AppResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for t in raw {
        let t = t.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(AppError::validation(format!("at most {MAX_TAGS} tags allowed")));
    }
    Ok(out)
}

pub fn positive_amount(field: &str, value: f64) -> AppResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AppError::validation(format!("{field} must be a positive number")))
    }
}

pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (limit.unwrap_or(20).clamp(1, 100), offset.unwrap_or(0).max(0))
}
