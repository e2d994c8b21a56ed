//! Environment override for property-test case counts.

use std::env;

/// Environment variable overriding the number of proptest cases.
pub const PROPTEST_CASES_ENV_KEY: &str = "TREEDRAW_PROPTEST_CASES";

/// Returns the case count from [`PROPTEST_CASES_ENV_KEY`], or `default` when
/// the variable is unset or invalid.
///
/// # Examples
/// ```
/// use treedraw_test_support::proptest_profile::property_cases;
///
/// assert!(property_cases(32) > 0);
/// ```
#[must_use]
pub fn property_cases(default: u32) -> u32 {
    let Ok(raw) = env::var(PROPTEST_CASES_ENV_KEY) else {
        return default;
    };
    match parse_cases(&raw) {
        Ok(cases) => cases,
        Err(reason) => {
            tracing::warn!(
                env = PROPTEST_CASES_ENV_KEY,
                raw = %raw,
                reason = %reason,
                "invalid property-test case override; using default",
            );
            default
        }
    }
}

fn parse_cases(raw: &str) -> Result<u32, String> {
    let cases = raw
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("parse error: {error}"))?;
    if cases == 0 {
        return Err("cases must be > 0".to_owned());
    }
    Ok(cases)
}
