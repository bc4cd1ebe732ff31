use std::sync::LazyLock;

use regex::Regex;

use crate::models::AccountNameMap;

pub const NAME_UNAVAILABLE: &str = "account name not available";

// (head, tail) characters kept when shortening an address
pub const SUI_SHORT: (usize, usize) = (6, 4);
pub const HEDERA_SHORT: (usize, usize) = (8, 6);
pub const HEDERA_BURN_SHORT: (usize, usize) = (10, 6);

const MIST_PER_SUI: f64 = 1_000_000_000.0;
// Upstream token metadata beyond this is treated as bogus
const MAX_TOKEN_DECIMALS: u32 = 18;

static COIN_INNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Coin<[^>]+::([^:>]+)>").expect("static regex"));

/// Shortens long addresses for readability (0x1234...abcd).
///
/// Ids short enough that shortening would not save anything are returned as-is.
pub fn short_address(address: &str, (head, tail): (usize, usize)) -> String {
    if address.is_empty() {
        return "Unknown".to_string();
    }
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= head + tail + 3 {
        return address.to_string();
    }
    let start: String = chars[..head].iter().collect();
    let end: String = chars[chars.len() - tail..].iter().collect();
    format!("{}...{}", start, end)
}

// "Name (0x1234...abcd)" or "0x1234...abcd (account name not available)"
pub fn display_name(address: &str, names: &AccountNameMap, short: (usize, usize)) -> String {
    let short_addr = short_address(address, short);
    match names.get(address) {
        Some(name) => format!("{} ({})", name, short_addr),
        None => format!("{} ({})", short_addr, NAME_UNAVAILABLE),
    }
}

// Label used in balance-change rows: the bare name when known
pub fn balance_label(address: &str, names: &AccountNameMap, short: (usize, usize)) -> String {
    match names.get(address) {
        Some(name) => name.to_string(),
        None => format!("{} ({})", short_address(address, short), NAME_UNAVAILABLE),
    }
}

/// Formats a coin amount whose unit is not tagged by the source.
///
/// Values of one million or more are taken to be in the smallest denomination and
/// scaled by 1e9; tiny values print in exponential notation.
pub fn format_amount(amount: f64) -> String {
    if amount == 0.0 {
        return "0".to_string();
    }
    if amount >= 1_000_000.0 {
        let whole = amount / MIST_PER_SUI;
        return if whole >= 1.0 {
            group_decimal(whole, 2)
        } else {
            format!("{:.6}", whole)
        };
    }
    if amount < 0.000_001 {
        return format!("{:.2e}", amount);
    }
    group_decimal(amount, 9)
}

// Gas is always reported in MIST by the node
pub fn format_gas(mist: i128) -> String {
    let sui = mist as f64 / MIST_PER_SUI;
    if sui < 0.000_001 {
        return format!("{} MIST", mist);
    }
    format!("{:.9} SUI", sui)
}

// Tinybar → HBAR with nine fixed digits
pub fn format_hbar(tinybar: i64) -> String {
    format!("{:.9}", tinybar.unsigned_abs() as f64 / 100_000_000.0)
}

/// Scales a raw token amount by its decimals, dropping trailing fractional zeros.
pub fn format_token_amount(raw: i64, decimals: u32) -> String {
    let decimals = decimals.min(MAX_TOKEN_DECIMALS);
    let scaled = raw.unsigned_abs() as f64 / 10f64.powi(decimals as i32);
    let fixed = format!("{:.*}", decimals as usize, scaled);
    trim_fraction(&fixed)
}

/// en-US style grouping ("1,234.5") with at most `max_fraction` digits.
pub fn group_decimal(value: f64, max_fraction: usize) -> String {
    let fixed = format!("{:.*}", max_fraction, value.abs());
    let trimmed = trim_fraction(&fixed);
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (trimmed.clone(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && trimmed != "0" { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

fn trim_fraction(fixed: &str) -> String {
    if !fixed.contains('.') {
        return fixed.to_string();
    }
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Human symbol for a Move coin type or object type.
///
/// `0x2::coin::Coin<0x..::usdc::USDC>` → `USDC`, `0x2::sui::SUI` → `SUI`.
pub fn token_symbol(type_str: &str) -> String {
    if let Some(caps) = COIN_INNER.captures(type_str) {
        return capitalize(&caps[1]);
    }
    if type_str.contains("::") {
        let last = type_str
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .trim_end_matches('>');
        if !last.is_empty() {
            return last.to_string();
        }
    }
    if !type_str.is_empty() && !type_str.contains(['<', '>', ':']) {
        return type_str.to_string();
    }
    "Token".to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

// "1 object was" / "3 objects were"
pub fn count_phrase(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {} was", noun)
    } else {
        format!("{} {}s were", count, noun)
    }
}

pub fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortens_sui_addresses() {
        let addr = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        assert_eq!(short_address(addr, SUI_SHORT), "0x1234...cdef");
    }

    #[test]
    fn keeps_short_hedera_ids_whole() {
        assert_eq!(short_address("0.0.100", HEDERA_SHORT), "0.0.100");
        assert_eq!(short_address("", SUI_SHORT), "Unknown");
    }

    #[test]
    fn display_name_marks_missing_names() {
        let mut names = AccountNameMap::new();
        names.insert("0.0.200", "Bob");
        assert_eq!(display_name("0.0.200", &names, HEDERA_SHORT), "Bob (0.0.200)");
        assert_eq!(
            display_name("0.0.100", &names, HEDERA_SHORT),
            "0.0.100 (account name not available)"
        );
        assert_eq!(balance_label("0.0.200", &names, HEDERA_SHORT), "Bob");
    }

    #[test]
    fn amount_thresholds() {
        assert_eq!(format_amount(0.0), "0");
        // smallest-unit heuristics
        assert_eq!(format_amount(1_500_000_000.0), "1.5");
        assert_eq!(format_amount(1_234_560_000_000.0), "1,234.56");
        assert_eq!(format_amount(5_000_000.0), "0.005000");
        // left alone below a million
        assert_eq!(format_amount(995.0), "995");
        assert_eq!(format_amount(12_345.678), "12,345.678");
        assert_eq!(format_amount(0.000_000_5), "5.00e-7");
    }

    #[test]
    fn gas_formatting() {
        assert_eq!(format_gas(0), "0 MIST");
        assert_eq!(format_gas(999), "999 MIST");
        assert_eq!(format_gas(1_997_880), "0.001997880 SUI");
        assert_eq!(format_gas(-2_000), "-2000 MIST");
    }

    #[test]
    fn hbar_and_token_scaling() {
        assert_eq!(format_hbar(-100_000_000), "1.000000000");
        assert_eq!(format_token_amount(1_250_000, 6), "1.25");
        assert_eq!(format_token_amount(100, 0), "100");
        assert_eq!(format_token_amount(-500_000_000, 8), "5");
    }

    #[test]
    fn absurd_decimals_are_clamped() {
        assert_eq!(format_token_amount(2_500_000_000_000_000_000, u32::MAX), "2.5");
        assert_eq!(format_token_amount(2_500_000_000_000_000_000, 40), "2.5");
    }

    #[test]
    fn symbols_from_type_strings() {
        assert_eq!(token_symbol("0x2::coin::Coin<0x2::sui::SUI>"), "SUI");
        assert_eq!(token_symbol("0x2::coin::Coin<0xdba::usdc::USDC>"), "USDC");
        assert_eq!(token_symbol("0x2::sui::SUI"), "SUI");
        assert_eq!(token_symbol("HBAR"), "HBAR");
        assert_eq!(token_symbol(""), "Token");
    }

    #[test]
    fn grouping_handles_negatives_and_round_numbers() {
        assert_eq!(group_decimal(1_000_000.0, 2), "1,000,000");
        assert_eq!(group_decimal(-1234.5, 2), "-1,234.5");
        assert_eq!(group_decimal(0.1, 9), "0.1");
    }
}
