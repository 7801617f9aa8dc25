use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use anyhow::Result;
use std::cmp::Ordering;

/// Scales a raw token amount by `decimals`, trimming trailing fractional zeros
/// down to a single digit: `5 * 10^18` at 18 decimals becomes `"5.0"`.
pub fn scale_amount(value: U256, decimals: u8) -> Result<String> {
    let formatted = format_units(value, decimals)?;
    Ok(normalize(formatted))
}

fn normalize(mut formatted: String) -> String {
    if formatted.contains('.') {
        let len = formatted.trim_end_matches('0').len();
        formatted.truncate(len);
        if formatted.ends_with('.') {
            formatted.push('0');
        }
    }
    formatted
}

/// A stored balance counts as a holding when it is non-negative and not zero.
pub fn is_positive(amount: &str) -> bool {
    let amount = amount.trim();
    !amount.starts_with('-') && amount.chars().any(|c| matches!(c, '1'..='9'))
}

/// Orders two non-negative decimal strings numerically.
pub fn compare_amounts(a: &str, b: &str) -> Ordering {
    let (a_int, a_frac) = split_decimal(a);
    let (b_int, b_frac) = split_decimal(b);

    a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| {
            let width = a_frac.len().max(b_frac.len());
            format!("{a_frac:0<width$}").cmp(&format!("{b_frac:0<width$}"))
        })
}

fn split_decimal(amount: &str) -> (&str, &str) {
    let amount = amount.trim();
    let (int, frac) = amount.split_once('.').unwrap_or((amount, ""));
    (int.trim_start_matches('0'), frac)
}
