//! Response time validation.

use std::time::Duration;

use tracing::{info, warn};

use crate::errors::ApiError;

/// Default response-time ceiling.
pub const DEFAULT_MAX_RESPONSE_TIME: Duration = Duration::from_secs(10);

/// Fails when `assert_time` is set and `elapsed >= ceiling`.
///
/// A slow response is always logged as a warning, asserted or not.
pub fn validate_time(elapsed: Duration, assert_time: bool, ceiling: Duration) -> Result<(), ApiError> {
    let exceeded = elapsed >= ceiling;
    let seconds = elapsed.as_secs_f64();

    if exceeded {
        warn!(elapsed_s = seconds, ceiling_s = ceiling.as_secs_f64(), "Response time exceeded: {:.2} seconds", seconds);
    } else {
        info!(elapsed_s = seconds, "Response time: {:.2} seconds", seconds);
    }

    if !assert_time {
        warn!("Response time validation is disabled. Skipping validation...");
        return Ok(());
    }

    if exceeded {
        return Err(ApiError::ResponseTimeExceeded { elapsed, ceiling });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_response_passes() {
        assert!(validate_time(Duration::from_millis(250), true, DEFAULT_MAX_RESPONSE_TIME).is_ok());
    }

    #[test]
    fn test_slow_response_fails_when_asserting() {
        let result = validate_time(Duration::from_secs(15), true, DEFAULT_MAX_RESPONSE_TIME);
        assert!(matches!(
            result,
            Err(ApiError::ResponseTimeExceeded { elapsed, ceiling })
                if elapsed == Duration::from_secs(15) && ceiling == DEFAULT_MAX_RESPONSE_TIME
        ));
    }

    #[test]
    fn test_ceiling_itself_is_a_failure() {
        let ceiling = Duration::from_secs(2);
        assert!(validate_time(ceiling, true, ceiling).is_err());
    }

    #[test]
    fn test_slow_response_passes_when_not_asserting() {
        assert!(validate_time(Duration::from_secs(60), false, DEFAULT_MAX_RESPONSE_TIME).is_ok());
    }
}
