use thiserror::Error;

/// Money is held as an integer count of the currency's smallest unit (cents
/// for USD, EUR and CAD), so €50.00 is 5000.
pub type Cents = i64;

/// Format cents as a decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a decimal string into cents.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
///
/// More than two decimal places is rejected rather than truncated: a transfer
/// amount is never silently altered.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, fraction_str) = match digits.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (digits, ""),
    };

    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !fraction_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseCentsError::Overflow)?
    };

    let fraction: i64 = match fraction_str.len() {
        0 => 0,
        1 => fraction_str.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        2 => fraction_str.parse().map_err(|_| ParseCentsError::InvalidFormat)?,
        _ => return Err(ParseCentsError::TooPrecise),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(fraction))
        .ok_or(ParseCentsError::Overflow)?;

    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCentsError {
    #[error("invalid money format")]
    InvalidFormat,

    #[error("money amounts have at most two decimal places")]
    TooPrecise,

    #[error("money amount out of range")]
    Overflow,
}
