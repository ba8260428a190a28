//! Field-level rules shared by every entity's `Validate` impl.
//!
//! All checks are pure. A record is rejected with the first rule it breaks;
//! tree-wide checks that collect every violation live in the hierarchy block.

use crate::{Timestamp, ValidationError};

pub const NAME_MAX: usize = 100;
pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 500;
pub const TASK_DESCRIPTION_MAX: usize = 1000;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Character count of the trimmed value must fall in `min..=max`.
pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.trim().chars().count();
    if len == 0 && min > 0 {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    if len < min || len > max {
        return Err(ValidationError::InvalidLength {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

pub fn check_optional_length(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(v) => check_length(field, v, 0, max),
        None => Ok(()),
    }
}

pub fn check_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

pub fn check_order(order: i64) -> Result<(), ValidationError> {
    if order < 0 {
        return Err(ValidationError::InvalidFormat(format!(
            "order must be non-negative, got {order}"
        )));
    }
    Ok(())
}

pub fn check_hours(field: &str, hours: Option<f64>) -> Result<(), ValidationError> {
    match hours {
        Some(h) if !h.is_finite() || h < 0.0 => Err(ValidationError::InvalidFormat(format!(
            "{field} must be a non-negative number"
        ))),
        _ => Ok(()),
    }
}

/// `start <= end` whenever both ends are present.
pub fn check_date_range(
    what: &str,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ValidationError::InvalidDateRange(format!(
                "{what}: {} is after {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
    }
    Ok(())
}

/// `#RRGGBB`
pub fn check_color_hex(value: Option<&str>) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Ok(());
    };
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ValidationError::InvalidFormat(format!(
            "colorHex must look like #RRGGBB, got '{value}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    #[test]
    fn blank_name_is_missing() {
        assert_matches!(
            check_length("name", "   ", 1, NAME_MAX),
            Err(ValidationError::MissingField(f)) if f == "name"
        );
    }

    #[test]
    fn overlong_name_is_rejected() {
        let long = "x".repeat(NAME_MAX + 1);
        assert_matches!(
            check_length("name", &long, 1, NAME_MAX),
            Err(ValidationError::InvalidLength { max: NAME_MAX, .. })
        );
        assert!(check_length("name", &"x".repeat(NAME_MAX), 1, NAME_MAX).is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        assert!(check_length("name", "買い物リスト", 1, 6).is_ok());
    }

    #[test]
    fn inverted_date_range() {
        let now = Utc::now();
        assert!(check_date_range("phase", Some(now), Some(now)).is_ok());
        assert!(check_date_range("phase", Some(now), None).is_ok());
        assert_matches!(
            check_date_range("phase", Some(now), Some(now - Duration::days(1))),
            Err(ValidationError::InvalidDateRange(_))
        );
    }

    #[test]
    fn color_hex_format() {
        assert!(check_color_hex(None).is_ok());
        assert!(check_color_hex(Some("#1a2B3c")).is_ok());
        assert!(check_color_hex(Some("1a2B3c")).is_err());
        assert!(check_color_hex(Some("#12345G")).is_err());
    }

    #[test]
    fn negative_values() {
        assert!(check_order(-1).is_err());
        assert!(check_order(0).is_ok());
        assert!(check_hours("estimatedHours", Some(-0.5)).is_err());
        assert!(check_hours("estimatedHours", Some(f64::NAN)).is_err());
        assert!(check_hours("estimatedHours", None).is_ok());
    }
}
