//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use stackrun::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Builds the default stack name for a run started at `at`.
#[must_use]
pub fn stack_name_at(at: DateTime<Utc>) -> String {
    format!("emr-test-stack-{}", at.format("%Y%m%d%H%M%S"))
}

/// Builds the default stack name for a run starting now.
#[must_use]
pub fn default_stack_name() -> String {
    stack_name_at(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_stack_name_at() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(stack_name_at(at), "emr-test-stack-20240309070501");
    }

    #[test]
    fn test_default_stack_name_is_valid() {
        let name = default_stack_name();
        assert!(crate::template::validate_stack_name(&name).is_ok());
    }
}
