use crate::errors::AppError;

/// Trims `value` and rejects it if nothing is left.
pub fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Catalog item values must be strictly positive and fit the stored column.
pub fn item_points(points: i64) -> Result<i32, AppError> {
    if points <= 0 {
        return Err(AppError::Validation(format!(
            "points must be greater than zero, got {points}"
        )));
    }
    i32::try_from(points)
        .map_err(|_| AppError::Validation(format!("points {points} is too large")))
}

/// Deductions and initial allotments share the catalog's 32-bit range, which keeps
/// the 64-bit balance far from overflow.
const MAX_AMOUNT: i64 = i32::MAX as i64;

pub fn deduction_points(points: i64) -> Result<i64, AppError> {
    if points <= 0 {
        return Err(AppError::Validation(format!(
            "deduction must be greater than zero, got {points}"
        )));
    }
    if points > MAX_AMOUNT {
        return Err(AppError::Validation(format!("deduction {points} is too large")));
    }
    Ok(points)
}

pub fn initial_points(points: Option<i64>) -> Result<i64, AppError> {
    match points {
        None => Ok(0),
        Some(p) if p < 0 => Err(AppError::Validation(format!(
            "initial points must not be negative, got {p}"
        ))),
        Some(p) if p > MAX_AMOUNT => Err(AppError::Validation(format!(
            "initial points {p} is too large"
        ))),
        Some(p) => Ok(p),
    }
}

/// Applies `delta` to a balance, refusing results outside the stored range.
pub fn apply_delta(balance: i64, delta: i64) -> Result<i64, AppError> {
    balance
        .checked_add(delta)
        .ok_or_else(|| AppError::Validation("balance would be out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(require_text("name", "  Dishes ").unwrap(), "Dishes");
    }

    #[test]
    fn test_blank_text_is_rejected() {
        assert!(matches!(
            require_text("name", "   "),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_points_are_rejected() {
        assert!(item_points(0).is_err());
        assert!(item_points(-5).is_err());
        assert_eq!(item_points(50).unwrap(), 50);
    }

    #[test]
    fn test_points_beyond_column_range_are_rejected() {
        assert!(item_points(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn test_initial_points_default_to_zero() {
        assert_eq!(initial_points(None).unwrap(), 0);
        assert_eq!(initial_points(Some(25)).unwrap(), 25);
        assert!(initial_points(Some(-1)).is_err());
    }

    #[test]
    fn test_deduction_must_be_positive() {
        assert!(deduction_points(0).is_err());
        assert_eq!(deduction_points(15).unwrap(), 15);
    }

    #[test]
    fn test_amounts_beyond_32_bits_are_rejected() {
        assert!(deduction_points(i64::MAX).is_err());
        assert!(initial_points(Some(i64::MAX)).is_err());
        assert_eq!(initial_points(Some(MAX_AMOUNT)).unwrap(), MAX_AMOUNT);
    }

    #[test]
    fn test_balance_overflow_is_a_validation_error() {
        assert!(matches!(
            apply_delta(i64::MAX, 1),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            apply_delta(i64::MIN, -1),
            Err(AppError::Validation(_))
        ));
        assert_eq!(apply_delta(40, -50).unwrap(), -10);
    }
}
