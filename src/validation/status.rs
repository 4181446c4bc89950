//! Status code validation.

use tracing::{error, info};

use crate::errors::ApiError;

/// Lowest and highest status codes a real HTTP response can carry.
pub const STATUS_RANGE: std::ops::RangeInclusive<u16> = 100..=599;

/// Checks `observed` against `expected`.
///
/// A status outside [`STATUS_RANGE`] is always an error, even with
/// `assert_status` off: it means the transport layer produced garbage.
pub fn validate_status(observed: u16, expected: u16, assert_status: bool) -> Result<(), ApiError> {
    if !STATUS_RANGE.contains(&observed) {
        let err = ApiError::InvalidStatusRange { status: observed };
        error!(status = observed, "{}", err);
        return Err(err);
    }

    info!(status = observed, "Response status {} is valid.", observed);

    if !assert_status {
        info!(
            expected,
            actual = observed,
            "Skipping status code assertion"
        );
        return Ok(());
    }

    if observed != expected {
        return Err(ApiError::StatusMismatch {
            expected,
            actual: observed,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_status_passes() {
        assert!(validate_status(200, 200, true).is_ok());
        assert!(validate_status(404, 404, true).is_ok());
    }

    #[test]
    fn test_mismatch_carries_both_values() {
        let err = validate_status(404, 200, true).unwrap_err();
        assert!(matches!(
            err,
            ApiError::StatusMismatch {
                expected: 200,
                actual: 404
            }
        ));
    }

    #[test]
    fn test_mismatch_ignored_when_not_asserting() {
        assert!(validate_status(500, 200, false).is_ok());
    }

    #[test]
    fn test_out_of_range_always_fails() {
        for status in [0, 1, 99, 600, 999, u16::MAX] {
            for assert_status in [true, false] {
                let result = validate_status(status, status, assert_status);
                assert!(
                    matches!(result, Err(ApiError::InvalidStatusRange { status: s }) if s == status),
                    "status {status} with assert_status={assert_status} should fail"
                );
            }
        }
    }

    #[test]
    fn test_range_bounds_are_valid() {
        assert!(validate_status(100, 100, true).is_ok());
        assert!(validate_status(599, 599, true).is_ok());
    }
}
