//! TTL duration expressions.
//!
//! Accepts an integer with an optional unit suffix (`30s`, `5m`, `12h`,
//! `7d`, `1w`). Terms may be chained (`1h30m`); a bare integer is seconds.

use std::time::Duration;

use crate::config::ConfigError;

/// Parse a duration expression into a positive `Duration`.
pub fn parse_ttl(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTtl(input.to_string());
    let expr = input.trim().to_ascii_lowercase();
    if expr.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    let mut chars = expr.chars().filter(|c| !c.is_whitespace()).peekable();

    while chars.peek().is_some() {
        let mut value: u64 = 0;
        let mut digits = 0;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(d)))
                .ok_or_else(invalid)?;
            digits += 1;
            chars.next();
        }
        if digits == 0 {
            return Err(invalid());
        }

        let multiplier = match chars.next_if(|c| c.is_ascii_alphabetic()) {
            None | Some('s') => 1,
            Some('m') => 60,
            Some('h') => 3_600,
            Some('d') => 86_400,
            Some('w') => 604_800,
            Some(_) => return Err(invalid()),
        };

        total = value
            .checked_mul(multiplier)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
    }

    if total == 0 {
        return Err(invalid());
    }

    Ok(Duration::from_secs(total))
}
